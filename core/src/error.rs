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
                pub fn kind(&self) -> &Inner { &self.inner }
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
    CustomError = String;
    StorageError = crate::error::StorageError;
    SerdeJsonError = serde_json::Error;
    ReqwestError = reqwest::Error;
    HexError = hex::FromHexError;
    PadError = cipher::block_padding::UnpadError
}

impl global::Error {
    pub fn custom(str: impl AsRef<str>) -> Self {
        global::Inner::CustomError(str.as_ref().to_string()).into()
    }
}

pub type Result<T> = ::std::result::Result<T, global::Error>;
pub use global::Error;
pub use global::Inner as ErrorKind;

/// The error kinds raised by the storage engine, per the boundary contract:
/// the facade never recovers by guessing intent, it surfaces one of these.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// A read was attempted without a configured deployment/environment scope.
    MissingDeploymentID,
    /// Reassembly was requested with zero fragments.
    EmptyFragmentSet,
    /// After the repair pass, fewer chunks are present than `total` declares.
    IncompleteFragmentSet { rid: String, op: String, present: usize, total: usize },
    /// The fragment indices for one write group are not a contiguous `[0, total)`.
    FragmentSequenceError { rid: String, op: String },
    /// A write would exceed the configured per-record fragment cap.
    TooManyFragments { count: usize, max: usize },
    /// Wrong key, corrupted ciphertext, or a malformed envelope.
    DecryptionError(String),
    /// The log-search GraphQL layer returned no result or a malformed payload.
    SearchBackendError(String),
    /// A network request exceeded its deadline.
    Timeout,
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl StorageError {
    pub fn missing_deployment_id<T>() -> Result<T> {
        Err(Self::MissingDeploymentID.into())
    }

    pub fn empty_fragment_set<T>() -> Result<T> {
        Err(Self::EmptyFragmentSet.into())
    }
}
