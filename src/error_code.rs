#[derive(Debug, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub(crate) struct ErrorCode {
    code: &'static str,
}

impl ErrorCode {
    pub(crate) const fn as_str(&self) -> &'static str {
        self.code
    }

    pub(crate) const COMMAND_TIMEOUT: ErrorCode = ErrorCode {
        code: "command-timeout",
    };
    pub(crate) const COMMAND_ERROR: ErrorCode = ErrorCode {
        code: "command-error",
    };
    pub(crate) const COMMAND_FAILURE: ErrorCode = ErrorCode {
        code: "command-failure",
    };
    pub(crate) const COMMAND_NOT_FOUND: ErrorCode = ErrorCode {
        code: "command-not-found",
    };
    pub(crate) const COMMAND_PERMISSION_DENIED: ErrorCode = ErrorCode {
        code: "command-permission-denied",
    };
    pub(crate) const METADATA_UNAVAILABLE: ErrorCode = ErrorCode {
        code: "metadata-unavailable",
    };
    pub(crate) const PROBE_TIMEOUT: ErrorCode = ErrorCode {
        code: "probe-timeout",
    };
    pub(crate) const REMUX_FAILED: ErrorCode = ErrorCode {
        code: "remux-failed",
    };
    pub(crate) const REMUX_TIMEOUT: ErrorCode = ErrorCode {
        code: "remux-timeout",
    };
    pub(crate) const OBJECT_STORAGE_ERROR: ErrorCode = ErrorCode {
        code: "object-storage-error",
    };
    pub(crate) const INVALID_OBJECT_KEY: ErrorCode = ErrorCode {
        code: "invalid-object-key",
    };
    pub(crate) const REPO_ERROR: ErrorCode = ErrorCode { code: "repo-error" };
    pub(crate) const PANIC: ErrorCode = ErrorCode { code: "panic" };
    pub(crate) const IO_ERROR: ErrorCode = ErrorCode { code: "io-error" };
    pub(crate) const FILE_UPLOAD_ERROR: ErrorCode = ErrorCode {
        code: "file-upload-error",
    };
    pub(crate) const VALIDATE_NO_FILES: ErrorCode = ErrorCode {
        code: "validate-no-files",
    };
    pub(crate) const VALIDATE_CONTENT_TYPE: ErrorCode = ErrorCode {
        code: "validate-content-type",
    };
    pub(crate) const VALIDATE_FILE_SIZE: ErrorCode = ErrorCode {
        code: "validate-file-size",
    };
    pub(crate) const INVALID_VIDEO_ID: ErrorCode = ErrorCode {
        code: "invalid-video-id",
    };
    pub(crate) const MISSING_TOKEN: ErrorCode = ErrorCode {
        code: "missing-token",
    };
    pub(crate) const INVALID_TOKEN: ErrorCode = ErrorCode {
        code: "invalid-token",
    };
    pub(crate) const NOT_VIDEO_OWNER: ErrorCode = ErrorCode {
        code: "not-video-owner",
    };
    pub(crate) const VIDEO_NOT_FOUND: ErrorCode = ErrorCode {
        code: "video-not-found",
    };
    pub(crate) const NO_VIDEO_URL: ErrorCode = ErrorCode {
        code: "no-video-url",
    };
    pub(crate) const UNKNOWN_ERROR: ErrorCode = ErrorCode {
        code: "unknown-error",
    };
}
