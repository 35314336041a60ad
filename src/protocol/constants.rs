//! WAMP v1 protocol constants

/// Protocol version announced in WELCOME
pub const PROTOCOL_VERSION: u64 = 1;

/// Default server identification string sent in WELCOME
pub const DEFAULT_SERVER_IDENT: &str = concat!("wamp-rs/", env!("CARGO_PKG_VERSION"));

// Message type tags
pub const TYPE_ID_WELCOME: u64 = 0;
pub const TYPE_ID_PREFIX: u64 = 1;
pub const TYPE_ID_CALL: u64 = 2;
pub const TYPE_ID_CALL_RESULT: u64 = 3;
pub const TYPE_ID_CALL_ERROR: u64 = 4;
pub const TYPE_ID_SUBSCRIBE: u64 = 5;
pub const TYPE_ID_UNSUBSCRIBE: u64 = 6;
pub const TYPE_ID_PUBLISH: u64 = 7;
pub const TYPE_ID_EVENT: u64 = 8;

/// Error URI for failures the application reports without its own URI
pub const ERROR_URI_GENERIC: &str = "http://autobahn.tavendo.de/error#generic";

/// Error URI for calls that were not answered within `call_timeout`
pub const ERROR_URI_TIMEOUT: &str = "http://autobahn.tavendo.de/error#timeout";

/// Error URI used when no handler implements `on_call`
pub const ERROR_URI_NO_SUCH_PROCEDURE: &str = "http://autobahn.tavendo.de/error#nosuchprocedure";
