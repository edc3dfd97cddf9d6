use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, RETRY_AFTER};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// Sends `request` and reads the whole body within `budget`.
///
/// Elapsed budget maps to [`AdapterError::Timeout`], connection failures to
/// [`AdapterError::Transport`], 429 to [`AdapterError::RateLimited`], and any
/// other non-2xx status to [`AdapterError::Response`].
pub(crate) async fn exchange(
    client: &HyperClient,
    request: Request<Body>,
    budget: Duration,
    provider: &str,
) -> AdapterResult<Bytes> {
    if budget.is_zero() {
        return Err(AdapterError::Timeout { budget });
    }

    let call = async {
        let response = client
            .request(request)
            .await
            .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read {provider} response: {err}"))
        })?;
        Ok::<_, AdapterError>((status, retry_after, bytes))
    };

    let (status, retry_after, bytes) = timeout(budget, call)
        .await
        .map_err(|_| AdapterError::Timeout { budget })??;

    classify_status(status, retry_after, &bytes, provider)?;
    Ok(bytes)
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &[u8],
    provider: &str,
) -> AdapterResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AdapterError::RateLimited { retry_after });
    }
    let reason = String::from_utf8_lossy(body);
    Err(AdapterError::response(format!(
        "{provider} returned {status}: {reason}"
    )))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn sanitize_base_url(input: &str, provider: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{provider} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {provider} base URL: {err}"))
    })?;
    Ok(base)
}
