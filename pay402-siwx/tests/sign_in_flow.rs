//! End-to-end sign-in flow: a wallet pays once for a resource, then
//! re-authenticates with a signed CAIP-122 message instead of paying
//! again, and a replayed sign-in header is rejected.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use http::HeaderMap;
use pay402::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse,
};
use pay402::scheme::{AssetAmount, BoxFuture, SchemeError, SchemeServer};
use pay402::server::{FacilitatorClient, X402ResourceServer};
use pay402_http::headers::encode_payment_signature;
use pay402_http::server::{HttpResourceServer, payment_required_from_result};
use pay402_http::types::{
    PaymentOption, ProcessResult, RequestContext, RouteConfig, RoutesConfig,
};
use pay402_siwx::{
    EvmSiwxSigner, InMemorySiwxStorage, SIWX_EXTENSION_KEY, SiwxConfig, SiwxExtension,
    siwx_payment_required_hook,
};
use serde_json::json;

/// Facilitator stub that accepts every payment and settles with the
/// configured payer.
struct StubFacilitator {
    payer: String,
}

impl FacilitatorClient for StubFacilitator {
    fn verify<'a>(
        &'a self,
        _payload: &'a PaymentPayload,
        _requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        let payer = self.payer.clone();
        Box::pin(async move { Ok(VerifyResponse::valid(payer)) })
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        _requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        let payer = self.payer.clone();
        let network = payload.network().to_owned();
        Box::pin(async move { Ok(SettleResponse::success("0xTX", network, payer)) })
    }

    fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
        Box::pin(async {
            Ok(SupportedResponse {
                kinds: vec![SupportedKind {
                    x402_version: 2,
                    scheme: "exact".into(),
                    network: "eip155:*".into(),
                    extra: None,
                }],
                extensions: vec![SIWX_EXTENSION_KEY.to_owned()],
                signers: HashMap::new(),
            })
        })
    }
}

struct PassthroughScheme;

impl SchemeServer for PassthroughScheme {
    fn scheme(&self) -> &str {
        "exact"
    }

    fn parse_price(
        &self,
        price: &serde_json::Value,
        _network: &str,
    ) -> Result<AssetAmount, SchemeError> {
        Ok(AssetAmount {
            amount: price.as_str().unwrap_or_default().to_owned(),
            asset: "0xUSDC".into(),
            extra: None,
        })
    }

    fn enhance_payment_requirements(
        &self,
        requirements: PaymentRequirements,
        _supported_kind: &SupportedKind,
        _facilitator_extensions: &[String],
    ) -> PaymentRequirements {
        requirements
    }
}

async fn build_stack(payer: &str) -> (HttpResourceServer, Arc<SiwxExtension>) {
    let storage = Arc::new(InMemorySiwxStorage::new());
    let extension = Arc::new(SiwxExtension::new(
        SiwxConfig {
            networks: vec!["eip155:8453".into()],
            expiration_seconds: Some(300),
            ..SiwxConfig::default()
        },
        storage,
    ));

    let mut server = X402ResourceServer::new();
    server.add_facilitator(Box::new(StubFacilitator {
        payer: payer.to_owned(),
    }));
    server.register("eip155:*", Box::new(PassthroughScheme));
    server.register_extension(Box::new(Arc::clone(&extension)));
    server.on_after_settle(Arc::clone(&extension).settlement_hook());
    server.initialize().await.unwrap();

    let mut routes = RoutesConfig::new();
    routes.insert(
        "GET /weather".into(),
        RouteConfig::single(PaymentOption::new(
            "exact",
            "eip155:8453",
            "0xPAY",
            json!("1000000"),
        ))
        .with_extension(SIWX_EXTENSION_KEY, json!({})),
    );

    let http = HttpResourceServer::new(Arc::new(server), routes)
        .on_protected_request(Arc::clone(&extension).protected_request_hook());
    (http, extension)
}

fn request(headers: HeaderMap) -> RequestContext {
    RequestContext {
        method: "GET".into(),
        path: "/weather".into(),
        query: None,
        headers,
        url: "http://localhost/weather".into(),
    }
}

#[tokio::test]
async fn pay_once_then_sign_in_and_replay_is_rejected() {
    let wallet = PrivateKeySigner::random();
    let payer = format!("{:#x}", wallet.address());
    let (http, _extension) = build_stack(&payer).await;

    // 1. Unauthenticated request: 402 with a sign-in challenge attached.
    let result = http.process_http_request(&request(HeaderMap::new())).await;
    let challenge = payment_required_from_result(&result).expect("402 with challenge");
    let declaration = challenge.extensions.as_ref().unwrap()[SIWX_EXTENSION_KEY].clone();
    assert!(declaration["nonce"].is_string());
    assert_eq!(declaration["supportedChains"][0]["chainId"], "eip155:8453");

    // 2. Pay: signed payload whose accepted copies the advertised entry.
    let payload = PaymentPayload {
        x402_version: 2,
        accepted: challenge.accepts[0].clone(),
        payload: json!({"signature": "0xsig"}),
        resource: challenge.resource.clone(),
        extensions: None,
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        "payment-signature",
        encode_payment_signature(&payload).unwrap().parse().unwrap(),
    );
    let result = http.process_http_request(&request(headers)).await;
    let ProcessResult::PaymentVerified(instructions) = result else {
        panic!("payment should verify");
    };
    let settle_result = http.process_settlement(&instructions).await;
    assert!(settle_result.success);
    assert_eq!(settle_result.payer.as_deref(), Some(payer.as_str()));

    // 3. Sign in: answer a fresh challenge with the wallet signature.
    let result = http.process_http_request(&request(HeaderMap::new())).await;
    let challenge = payment_required_from_result(&result).expect("fresh 402");
    let hook = siwx_payment_required_hook(Arc::new(EvmSiwxSigner::new(wallet)));
    let sign_in_headers = hook(&pay402::proto::helpers::PaymentRequiredEnum::V2(Box::new(
        challenge,
    )))
    .await
    .expect("sign-in header produced");

    let result = http.process_http_request(&request(sign_in_headers.clone())).await;
    assert!(
        matches!(result, ProcessResult::AccessGranted),
        "signed-in wallet that already paid gets access without paying"
    );

    // 4. Replay the exact same header: nonce is burned, back to 402.
    let result = http.process_http_request(&request(sign_in_headers)).await;
    assert!(
        matches!(result, ProcessResult::PaymentError { status: 402, .. }),
        "replayed sign-in falls through to a fresh challenge"
    );
}
