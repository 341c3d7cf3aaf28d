use const_format::formatcp;

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_SHA: &str = env!("VERGEN_GIT_SHA");
const BUILD_DATE: &str = env!("VERGEN_BUILD_DATE");

const SHORT_VERSION: &str = formatcp!("{VERSION} ({GIT_SHA} {BUILD_DATE})");
const USER_AGENT: &str = formatcp!("{PKG_NAME}/{VERSION} (+{GIT_SHA})");

/// clap の `--version` と起動ログ用のバージョン文字列を返す。
pub fn short_version() -> &'static str {
    SHORT_VERSION
}

/// Dreamhack API と Webhook へのリクエストに付与する User-Agent。
pub fn user_agent() -> &'static str {
    USER_AGENT
}
