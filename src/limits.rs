// ── Input bounds ─────────────────────────────────────────────────

/// Longest company id accepted in a view filter.
pub const MAX_COMPANY_ID_LEN: usize = 128;

/// Longest reservation id accepted by the status mutator.
pub const MAX_RESERVATION_ID_LEN: usize = 128;

/// Error bodies from the backend are truncated to this many bytes.
pub const MAX_ERROR_BODY_LEN: usize = 512;

// ── Timing ───────────────────────────────────────────────────────

/// Default bound on a single fetch or status update.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// First reconnect delay after the push channel drops.
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Reconnect delay ceiling.
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

// ── Channels ─────────────────────────────────────────────────────

/// Notices buffered per subscriber before the slowest one starts lagging.
pub const NOTICE_CHANNEL_CAPACITY: usize = 256;
