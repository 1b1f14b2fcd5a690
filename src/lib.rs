pub mod api;
pub mod config;
pub mod dispatch;
pub mod notify;
pub mod reporter;
pub mod scanner;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

/// Site root POSTed once per cycle to obtain the session cookies the API requires.
pub const DEFAULT_PRIMING_URL: &str = "https://www.vinted.ie";

/// Marketplace REST API base URL (catalog search and user profiles live under it).
pub const DEFAULT_API_BASE: &str = "https://www.vinted.ie/api/v2";

/// Environment variable holding the chat webhook URL.
pub const WEBHOOK_URL_ENV: &str = "WEBHOOK_URL";

/// Footer label attached to every notification.
pub const DEFAULT_FOOTER: &str = "🤖 Vinted Scanner Bot";
