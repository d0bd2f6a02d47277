use copyscan_core::Error;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    InvalidConfig,
    NotConfigured,
    NotSupported,
    SearchFailed,
    FetchFailed,
    SessionFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::InvalidConfig => "invalid_config",
            Self::NotConfigured => "not_configured",
            Self::NotSupported => "not_supported",
            Self::SearchFailed => "search_failed",
            Self::FetchFailed => "fetch_failed",
            Self::SessionFailed => "session_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::SearchFailed | Self::FetchFailed | Self::SessionFailed => true,
            Self::InvalidParams
            | Self::InvalidUrl
            | Self::InvalidConfig
            | Self::NotConfigured
            | Self::NotSupported
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => "Pass a non-empty document via --text, --file, or stdin.",
            Self::InvalidConfig => "Check numeric flags / COPYSCAN_* variables (workers and max results must be >= 1).",
            Self::NotConfigured => {
                "Run `copyscan doctor`. The playwright backend needs Node.js + `npm i -g playwright` + `npx playwright install chromium`; or use --backend http."
            }
            Self::NotSupported => "Check COPYSCAN_BACKEND / COPYSCAN_SEARCH_PROVIDER values.",
            _ => "",
        }
    }
}

impl From<&Error> for ErrorCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::InvalidInput(_) => Self::InvalidParams,
            Error::InvalidUrl(_) => Self::InvalidUrl,
            Error::InvalidConfig(_) => Self::InvalidConfig,
            Error::NotConfigured(_) => Self::NotConfigured,
            Error::NotSupported(_) => Self::NotSupported,
            Error::Search(_) => Self::SearchFailed,
            Error::Navigate(_) | Error::Extract(_) => Self::FetchFailed,
            Error::Session(_) => Self::SessionFailed,
        }
    }
}

pub(crate) fn error_obj(code: ErrorCode, message: impl ToString) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: &'static str,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: code.hint(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": code.hint(),
            "retryable": code.retryable()
        }),
    }
}

/// `{"ok": false, "error": {...}}` for an `anyhow` chain, classifying library errors.
pub(crate) fn error_payload(err: &anyhow::Error) -> serde_json::Value {
    let code = err
        .downcast_ref::<Error>()
        .map(ErrorCode::from)
        .unwrap_or(ErrorCode::UnexpectedError);
    serde_json::json!({
        "ok": false,
        "error": error_obj(code, format!("{err:#}")),
    })
}
