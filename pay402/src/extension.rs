//! Named protocol extensions.
//!
//! Extensions splice additional behavior into the payment lifecycle under a
//! unique string key (e.g. `"sign-in-with-x"`). Rather than inheritance,
//! an extension exposes optional enrichment methods; per-key output is
//! grafted back into the wire message under the same key. Enrichment
//! failures are logged and skipped by the caller — they never fail the
//! request.

use std::sync::Arc;

use serde_json::Value;

use crate::proto::{PaymentRequired, SettleResponse};
use crate::scheme::SchemeError;

/// A named extension registered on a resource server.
///
/// All enrichment methods default to returning the declaration unchanged;
/// implementations override only the points they participate in.
pub trait ResourceServerExtension: Send + Sync {
    /// Unique extension key (e.g. `"sign-in-with-x"`).
    fn key(&self) -> &str;

    /// Enriches an extension declaration with transport-specific data.
    ///
    /// Called by the HTTP layer before the 402 response is built.
    /// `transport_context` is opaque serialized request metadata.
    ///
    /// # Errors
    ///
    /// An error is logged by the caller and the original declaration kept.
    fn enrich_declaration(
        &self,
        declaration: &Value,
        _transport_context: &Value,
    ) -> Result<Value, SchemeError> {
        Ok(declaration.clone())
    }

    /// Enriches this extension's declaration in an outgoing 402 response.
    ///
    /// Called once per 402 with the response under construction. Typical
    /// use: regenerate challenge material (nonces, timestamps).
    ///
    /// # Errors
    ///
    /// An error is logged by the caller and the original declaration kept.
    fn enrich_payment_required_response(
        &self,
        declaration: &Value,
        _response: &PaymentRequired,
    ) -> Result<Value, SchemeError> {
        Ok(declaration.clone())
    }

    /// Enriches this extension's slot in a successful settlement response.
    ///
    /// # Errors
    ///
    /// An error is logged by the caller and the slot left untouched.
    fn enrich_settlement_response(
        &self,
        declaration: &Value,
        _response: &SettleResponse,
    ) -> Result<Value, SchemeError> {
        Ok(declaration.clone())
    }
}

impl<T: ResourceServerExtension + ?Sized> ResourceServerExtension for Arc<T> {
    fn key(&self) -> &str {
        self.as_ref().key()
    }

    fn enrich_declaration(
        &self,
        declaration: &Value,
        transport_context: &Value,
    ) -> Result<Value, SchemeError> {
        self.as_ref().enrich_declaration(declaration, transport_context)
    }

    fn enrich_payment_required_response(
        &self,
        declaration: &Value,
        response: &PaymentRequired,
    ) -> Result<Value, SchemeError> {
        self.as_ref()
            .enrich_payment_required_response(declaration, response)
    }

    fn enrich_settlement_response(
        &self,
        declaration: &Value,
        response: &SettleResponse,
    ) -> Result<Value, SchemeError> {
        self.as_ref().enrich_settlement_response(declaration, response)
    }
}
