//! Serde default functions.

use gunnel_core::defaults;

pub(crate) fn default_user() -> String {
    defaults::DEFAULT_USER.to_string()
}
pub(crate) fn default_group() -> String {
    defaults::DEFAULT_GROUP.to_string()
}
pub(crate) fn default_ciphers() -> String {
    defaults::DEFAULT_CIPHER_POLICY.to_string()
}
pub(crate) fn default_min_tls_version() -> String {
    defaults::DEFAULT_TLS_MIN_VERSION.to_string()
}
pub(crate) fn default_max_tls_version() -> String {
    defaults::DEFAULT_TLS_MAX_VERSION.to_string()
}
pub(crate) fn default_buffer_size() -> usize {
    defaults::DEFAULT_RELAY_BUFFER_SIZE
}
pub(crate) fn default_idle_timeout_secs() -> u64 {
    defaults::DEFAULT_IDLE_TIMEOUT_SECS
}
pub(crate) fn default_connect_timeout_secs() -> u64 {
    defaults::DEFAULT_CONNECT_TIMEOUT_SECS
}
pub(crate) fn default_handshake_timeout_secs() -> u64 {
    defaults::DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS
}
pub(crate) fn default_backlog() -> u32 {
    defaults::DEFAULT_LISTEN_BACKLOG
}
