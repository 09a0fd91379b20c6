//! HTTP-level constants for the x402 protocol.
//!
//! Header-name comparison is case-insensitive per HTTP semantics; the
//! canonical spellings below are what the server emits.

/// HTTP header for V2 payment signatures (client → server).
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";

/// HTTP header for 402 payment requirements (server → client).
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";

/// HTTP header for settlement results (server → client).
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// V1 legacy header for the payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// V1 legacy header for settlement results (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header name for exposing custom headers to browsers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Value the client attaches so browsers can read settlement headers.
pub const EXPOSED_PAYMENT_HEADERS: &str = "PAYMENT-RESPONSE,X-PAYMENT-RESPONSE";

/// Default timeout for facilitator calls.
pub const DEFAULT_FACILITATOR_TIMEOUT_SECS: u64 = 30;

/// Default public facilitator service URL.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";
