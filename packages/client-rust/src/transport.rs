//! Client-side HTTP codec and per-instance endpoint factory.
//!
//! `encode_*_request` build a [`WireRequest`] against an instance base URL;
//! `decode_*_response` turn a status code plus body back into the typed
//! response. A non-2xx status with a well-formed `{"error": ...}` body is a
//! business outcome and lands in the response's `err`; anything that cannot
//! be decoded is a call-level [`EndpointError::Decode`].

use std::time::{Duration, Instant};

use datasvc_core::messages::{
    DeleteNoteRequest, DeleteNoteResponse, EmptyBody, ErrorBody, GetNoteBody, GetNoteRequest,
    GetNoteResponse, PatchNoteRequest, PatchNoteResponse, PostNoteRequest, PostNoteResponse,
    PutNoteRequest, PutNoteResponse,
};
use datasvc_core::{CallContext, Endpoint, EndpointError, Endpoints, Note, ServiceError, NOTES_PATH};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// A fully encoded HTTP request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Vec<u8>>,
}

type Encoder<Req> = fn(&Url, Req) -> Result<WireRequest, EndpointError>;
type Decoder<Resp> = fn(StatusCode, &[u8]) -> Result<Resp, EndpointError>;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// `base` + `/notes` + optional percent-encoded id segment.
fn notes_url(base: &Url, id: Option<&str>) -> Result<Url, EndpointError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| EndpointError::Encode(format!("{base} cannot be a base URL")))?;
        segments
            .pop_if_empty()
            .push(NOTES_PATH.trim_start_matches('/'));
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

fn note_body(note: &Note) -> Result<Vec<u8>, EndpointError> {
    serde_json::to_vec(note).map_err(|e| EndpointError::Encode(e.to_string()))
}

/// `POST /notes` with the note as body.
///
/// # Errors
///
/// `Encode` if the URL cannot be built or the note cannot be serialized.
pub fn encode_post_note_request(base: &Url, req: PostNoteRequest) -> Result<WireRequest, EndpointError> {
    Ok(WireRequest {
        method: Method::POST,
        url: notes_url(base, None)?,
        body: Some(note_body(&req.note)?),
    })
}

/// `GET /notes/{id}`.
///
/// # Errors
///
/// `Encode` if the URL cannot be built.
pub fn encode_get_note_request(base: &Url, req: GetNoteRequest) -> Result<WireRequest, EndpointError> {
    Ok(WireRequest {
        method: Method::GET,
        url: notes_url(base, Some(&req.id))?,
        body: None,
    })
}

/// `PUT /notes/{id}` with the note as body.
///
/// # Errors
///
/// `Encode` if the URL cannot be built or the note cannot be serialized.
pub fn encode_put_note_request(base: &Url, req: PutNoteRequest) -> Result<WireRequest, EndpointError> {
    Ok(WireRequest {
        method: Method::PUT,
        url: notes_url(base, Some(&req.id))?,
        body: Some(note_body(&req.note)?),
    })
}

/// `PATCH /notes/{id}` with the partial note as body.
///
/// # Errors
///
/// `Encode` if the URL cannot be built or the note cannot be serialized.
pub fn encode_patch_note_request(
    base: &Url,
    req: PatchNoteRequest,
) -> Result<WireRequest, EndpointError> {
    Ok(WireRequest {
        method: Method::PATCH,
        url: notes_url(base, Some(&req.id))?,
        body: Some(note_body(&req.note)?),
    })
}

/// `DELETE /notes/{id}`.
///
/// # Errors
///
/// `Encode` if the URL cannot be built.
pub fn encode_delete_note_request(
    base: &Url,
    req: DeleteNoteRequest,
) -> Result<WireRequest, EndpointError> {
    Ok(WireRequest {
        method: Method::DELETE,
        url: notes_url(base, Some(&req.id))?,
        body: None,
    })
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_json<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, EndpointError> {
    serde_json::from_slice(body)
        .map_err(|e| EndpointError::Decode(format!("status {status}: {e}")))
}

/// Splits a response into success or embedded business error.
///
/// A 4xx error body, or a 5xx one naming a known service outcome, is the
/// instance's answer and gets embedded. Any other 5xx (draining, internal
/// failure) says nothing about the note and is a transport failure, so
/// another instance can be tried. Non-2xx without an error body is a
/// decode failure.
fn decode_outcome<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Result<T, ServiceError>, EndpointError> {
    if status.is_success() {
        return decode_json(status, body).map(Ok);
    }
    let ErrorBody { error } = decode_json(status, body)?;
    let err = ServiceError::from_message(&error);
    if status.is_server_error() && !(err.is_business() || err == ServiceError::BadRouting) {
        return Err(EndpointError::Transport(format!("status {status}: {error}")));
    }
    Ok(Err(err))
}

fn decode_unit(status: StatusCode, body: &[u8]) -> Result<Option<ServiceError>, EndpointError> {
    Ok(decode_outcome::<EmptyBody>(status, body)?.err())
}

/// # Errors
///
/// `Decode` if the body is not what the status promises.
pub fn decode_post_note_response(
    status: StatusCode,
    body: &[u8],
) -> Result<PostNoteResponse, EndpointError> {
    Ok(PostNoteResponse {
        err: decode_unit(status, body)?,
    })
}

/// A 200 must carry `{"note": ...}`.
///
/// # Errors
///
/// `Decode` if the body is not what the status promises.
pub fn decode_get_note_response(
    status: StatusCode,
    body: &[u8],
) -> Result<GetNoteResponse, EndpointError> {
    Ok(match decode_outcome::<GetNoteBody>(status, body)? {
        Ok(GetNoteBody { note }) => GetNoteResponse {
            note: Some(note),
            err: None,
        },
        Err(err) => GetNoteResponse {
            note: None,
            err: Some(err),
        },
    })
}

/// # Errors
///
/// `Decode` if the body is not what the status promises.
pub fn decode_put_note_response(
    status: StatusCode,
    body: &[u8],
) -> Result<PutNoteResponse, EndpointError> {
    Ok(PutNoteResponse {
        err: decode_unit(status, body)?,
    })
}

/// # Errors
///
/// `Decode` if the body is not what the status promises.
pub fn decode_patch_note_response(
    status: StatusCode,
    body: &[u8],
) -> Result<PatchNoteResponse, EndpointError> {
    Ok(PatchNoteResponse {
        err: decode_unit(status, body)?,
    })
}

/// # Errors
///
/// `Decode` if the body is not what the status promises.
pub fn decode_delete_note_response(
    status: StatusCode,
    body: &[u8],
) -> Result<DeleteNoteResponse, EndpointError> {
    Ok(DeleteNoteResponse {
        err: decode_unit(status, body)?,
    })
}

// ---------------------------------------------------------------------------
// Endpoint factory
// ---------------------------------------------------------------------------

/// Parses a discovered `host:port` (or full URL) into a base URL.
///
/// # Errors
///
/// `Encode` if the address is not a usable URL.
pub fn instance_url(instance: &str) -> Result<Url, EndpointError> {
    let raw = if instance.starts_with("http") {
        instance.to_string()
    } else {
        format!("http://{instance}")
    };
    Url::parse(&raw).map_err(|e| EndpointError::Encode(format!("instance {instance}: {e}")))
}

fn http_client() -> Result<reqwest::Client, EndpointError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| EndpointError::Transport(e.to_string()))
}

fn transport_error(err: &reqwest::Error, timeout: Option<Duration>) -> EndpointError {
    match timeout {
        Some(timeout) if err.is_timeout() => EndpointError::Timeout(timeout),
        _ => EndpointError::Transport(err.to_string()),
    }
}

async fn send<Resp>(
    client: &reqwest::Client,
    ctx: &CallContext,
    wire: WireRequest,
    decode: Decoder<Resp>,
) -> Result<Resp, EndpointError> {
    let mut builder = client.request(wire.method, wire.url);
    if let Some(request_id) = &ctx.request_id {
        builder = builder.header(REQUEST_ID_HEADER, request_id);
    }
    let timeout = ctx
        .deadline()
        .map(|deadline| deadline.saturating_duration_since(Instant::now()));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(body) = wire.body {
        builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| transport_error(&e, timeout))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(&e, timeout))?;
    decode(status, &body)
}

/// Binds one codec pair to one instance. The in-flight request is dropped
/// as soon as the context is cancelled.
fn http_endpoint<Req, Resp>(
    client: reqwest::Client,
    base: Url,
    encode: Encoder<Req>,
    decode: Decoder<Resp>,
) -> Endpoint<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    Endpoint::new(move |ctx: CallContext, req: Req| {
        let client = client.clone();
        let wire = encode(&base, req);
        async move {
            let wire = wire?;
            tokio::select! {
                biased;
                () = ctx.cancelled() => Err(EndpointError::Canceled),
                result = send(&client, &ctx, wire, decode) => result,
            }
        }
    })
}

/// `POST /notes` endpoint for one instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_post_note_endpoint(
    instance: &str,
) -> Result<Endpoint<PostNoteRequest, PostNoteResponse>, EndpointError> {
    Ok(http_endpoint(
        http_client()?,
        instance_url(instance)?,
        encode_post_note_request,
        decode_post_note_response,
    ))
}

/// `GET /notes/{id}` endpoint for one instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_get_note_endpoint(
    instance: &str,
) -> Result<Endpoint<GetNoteRequest, GetNoteResponse>, EndpointError> {
    Ok(http_endpoint(
        http_client()?,
        instance_url(instance)?,
        encode_get_note_request,
        decode_get_note_response,
    ))
}

/// `PUT /notes/{id}` endpoint for one instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_put_note_endpoint(
    instance: &str,
) -> Result<Endpoint<PutNoteRequest, PutNoteResponse>, EndpointError> {
    Ok(http_endpoint(
        http_client()?,
        instance_url(instance)?,
        encode_put_note_request,
        decode_put_note_response,
    ))
}

/// `PATCH /notes/{id}` endpoint for one instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_patch_note_endpoint(
    instance: &str,
) -> Result<Endpoint<PatchNoteRequest, PatchNoteResponse>, EndpointError> {
    Ok(http_endpoint(
        http_client()?,
        instance_url(instance)?,
        encode_patch_note_request,
        decode_patch_note_response,
    ))
}

/// `DELETE /notes/{id}` endpoint for one instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_delete_note_endpoint(
    instance: &str,
) -> Result<Endpoint<DeleteNoteRequest, DeleteNoteResponse>, EndpointError> {
    Ok(http_endpoint(
        http_client()?,
        instance_url(instance)?,
        encode_delete_note_request,
        decode_delete_note_response,
    ))
}

/// All five endpoints for one instance, sharing a single HTTP client.
///
/// Used for direct (undiscovered) access to a known instance.
///
/// # Errors
///
/// `Encode` for an unusable address, `Transport` if no HTTP client can be built.
pub fn make_client_endpoints(instance: &str) -> Result<Endpoints, EndpointError> {
    let base = instance_url(instance)?;
    let client = http_client()?;
    Ok(Endpoints {
        post_note: http_endpoint(
            client.clone(),
            base.clone(),
            encode_post_note_request,
            decode_post_note_response,
        ),
        get_note: http_endpoint(
            client.clone(),
            base.clone(),
            encode_get_note_request,
            decode_get_note_response,
        ),
        put_note: http_endpoint(
            client.clone(),
            base.clone(),
            encode_put_note_request,
            decode_put_note_response,
        ),
        patch_note: http_endpoint(
            client.clone(),
            base.clone(),
            encode_patch_note_request,
            decode_patch_note_response,
        ),
        delete_note: http_endpoint(
            client,
            base,
            encode_delete_note_request,
            decode_delete_note_response,
        ),
    })
}
