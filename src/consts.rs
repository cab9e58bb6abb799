pub mod submission {
    // Status polling. A stuck task gives up after roughly half an hour.
    pub const POLL_INTERVAL_MS: u64 = 1000;
    pub const MAX_POLL_ATTEMPTS: u32 = 1800;

    /// Per-request timeout for upload, launch and status calls.
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Capacity of the progress event channel handed to the host UI.
    pub const EVENT_QUEUE_SIZE: usize = 100;
}

pub mod endpoints {
    pub const UPLOAD: &str = "upload";
    pub const SIGNAL_START: &str = "signal_start";
    pub const TASK: &str = "task";
}

pub mod form {
    // Multipart field names expected by the backend.
    pub const APK_FIELD: &str = "apk_file";
    pub const FILENAME_FIELD: &str = "filename";
    pub const UUID_FIELD: &str = "uuid";

    pub const APK_MIME: &str = "application/vnd.android.package-archive";
    pub const OCTET_STREAM_MIME: &str = "application/octet-stream";
}
