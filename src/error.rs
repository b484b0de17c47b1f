macro_rules! multi_error {
    ($name:ident($($manual:ident),*); $($err:ident = $obj:ty);*) => {
        pub mod $name {
            use backtrace::Backtrace;

            #[derive(Debug)]
            pub enum Inner {
                $($err($obj),)*
                $($manual),*
            }

            impl std::fmt::Display for Inner { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { std::fmt::Debug::fmt(self, f) } }
            impl std::error::Error for Inner {}

            $(impl From<$obj> for Inner { fn from(value: $obj) -> Self { Self::$err(value) } })*

            pub struct Error {
                inner: Inner,
                backtrace: Backtrace
            }

            impl Error {
                pub fn kind(&self) -> &Inner {
                    &self.inner
                }
            }

            impl<Err> From<Err> for Error where Err: Into<Inner> {
                fn from(err: Err) -> Self {
                    Self {
                        inner: err.into(),
                        backtrace: Backtrace::new()
                    }
                }
            }

            impl std::error::Error for Error {}
            impl std::fmt::Display for Error {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { std::fmt::Debug::fmt(self, f) }
            }

            impl std::fmt::Debug for Error {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{:?}\n", &self.inner)?;
                    match std::env::var("RUST_BACKTRACE").as_ref().map(|i| i.as_ref()) {
                        Ok("full") => write!(f, "{:#?}", self.backtrace),
                        Ok("1") => write!(f, "{:?}", self.backtrace),
                        _ => write!(f, ""),
                    }
                }
            }
        }
    }
}

multi_error! { global();
    ManualError = crate::error::ManualError;
    LogCarError = logcar_core::Error;
    SerdeJsonError = serde_json::error::Error;
    IoError = std::io::Error;
    Base64Error = base64::DecodeError
}

pub type Result<T> = ::std::result::Result<T, global::Error>;
pub use global::Error;

#[derive(Debug, Clone)]
pub enum ManualError {
    AppStateMissing,
}

impl std::error::Error for ManualError {}
impl std::fmt::Display for ManualError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub enum TokenError {
    MissingToken,
    InvalidToken,
}

impl std::error::Error for TokenError {}
impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Maps a `logcar_core` storage error onto an HTTP status + JSON body
/// (spec's HTTP surface section). Unrecognised internal errors fall back
/// to 500 rather than leaking their debug representation.
impl actix_web::ResponseError for Error {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        use logcar_core::error::ErrorKind;

        match self.kind() {
            global::Inner::LogCarError(e) => match e.kind() {
                ErrorKind::StorageError(se) => storage_status(se),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(self.status_code()).json(serde_json::json! {{
            "success": false,
            "error": self.to_string(),
        }})
    }
}

fn storage_status(se: &logcar_core::StorageError) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    use logcar_core::StorageError::*;

    match se {
        MissingDeploymentID => StatusCode::SERVICE_UNAVAILABLE,
        EmptyFragmentSet | IncompleteFragmentSet { .. } | FragmentSequenceError { .. } => StatusCode::NOT_FOUND,
        TooManyFragments { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DecryptionError(_) => StatusCode::FORBIDDEN,
        SearchBackendError(_) => StatusCode::BAD_GATEWAY,
        Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl actix_web::ResponseError for TokenError {
    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::Unauthorized().json(serde_json::json! {{
            "success": false,
            "message": match self {
                TokenError::MissingToken => "Missing token",
                TokenError::InvalidToken => "Invalid token",
            }
        }})
    }
}
