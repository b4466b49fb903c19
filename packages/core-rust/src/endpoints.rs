//! Endpoint adapters between `NoteService` and the uniform [`Endpoint`] shape.
//!
//! `make_*_endpoint` turn one service operation into an endpoint (server
//! side). [`Endpoints`] bundles all five and, going the other way,
//! implements `NoteService` on top of whatever endpoints it holds (client
//! side: HTTP codecs behind a balancer and retry).

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::endpoint::Endpoint;
use crate::error::{EndpointError, ServiceError};
use crate::messages::{
    DeleteNoteRequest, DeleteNoteResponse, GetNoteRequest, GetNoteResponse, PatchNoteRequest,
    PatchNoteResponse, PostNoteRequest, PostNoteResponse, PutNoteRequest, PutNoteResponse,
};
use crate::note::Note;
use crate::traits::NoteService;

/// One endpoint per operation.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub post_note: Endpoint<PostNoteRequest, PostNoteResponse>,
    pub get_note: Endpoint<GetNoteRequest, GetNoteResponse>,
    pub put_note: Endpoint<PutNoteRequest, PutNoteResponse>,
    pub patch_note: Endpoint<PatchNoteRequest, PatchNoteResponse>,
    pub delete_note: Endpoint<DeleteNoteRequest, DeleteNoteResponse>,
}

/// Wraps every operation of `service` as an endpoint.
pub fn make_server_endpoints<S>(service: Arc<S>) -> Endpoints
where
    S: NoteService + ?Sized + 'static,
{
    Endpoints {
        post_note: make_post_note_endpoint(Arc::clone(&service)),
        get_note: make_get_note_endpoint(Arc::clone(&service)),
        put_note: make_put_note_endpoint(Arc::clone(&service)),
        patch_note: make_patch_note_endpoint(Arc::clone(&service)),
        delete_note: make_delete_note_endpoint(service),
    }
}

/// Splits a service result into (value, business error). A call-level
/// failure surfaced by the service stays on the endpoint's own error channel.
fn embed<T>(
    result: Result<T, ServiceError>,
) -> Result<(Option<T>, Option<ServiceError>), EndpointError> {
    match result {
        Ok(value) => Ok((Some(value), None)),
        Err(ServiceError::Unavailable(call)) => Err(call),
        Err(business) => Ok((None, Some(business))),
    }
}

pub fn make_post_note_endpoint<S>(service: Arc<S>) -> Endpoint<PostNoteRequest, PostNoteResponse>
where
    S: NoteService + ?Sized + 'static,
{
    Endpoint::new(move |ctx, req: PostNoteRequest| {
        let service = Arc::clone(&service);
        async move {
            let (_, err) = embed(service.post_note(&ctx, req.note).await)?;
            Ok(PostNoteResponse { err })
        }
    })
}

pub fn make_get_note_endpoint<S>(service: Arc<S>) -> Endpoint<GetNoteRequest, GetNoteResponse>
where
    S: NoteService + ?Sized + 'static,
{
    Endpoint::new(move |ctx, req: GetNoteRequest| {
        let service = Arc::clone(&service);
        async move {
            let (note, err) = embed(service.get_note(&ctx, &req.id).await)?;
            Ok(GetNoteResponse { note, err })
        }
    })
}

pub fn make_put_note_endpoint<S>(service: Arc<S>) -> Endpoint<PutNoteRequest, PutNoteResponse>
where
    S: NoteService + ?Sized + 'static,
{
    Endpoint::new(move |ctx, req: PutNoteRequest| {
        let service = Arc::clone(&service);
        async move {
            let (_, err) = embed(service.put_note(&ctx, &req.id, req.note).await)?;
            Ok(PutNoteResponse { err })
        }
    })
}

pub fn make_patch_note_endpoint<S>(
    service: Arc<S>,
) -> Endpoint<PatchNoteRequest, PatchNoteResponse>
where
    S: NoteService + ?Sized + 'static,
{
    Endpoint::new(move |ctx, req: PatchNoteRequest| {
        let service = Arc::clone(&service);
        async move {
            let (_, err) = embed(service.patch_note(&ctx, &req.id, req.note).await)?;
            Ok(PatchNoteResponse { err })
        }
    })
}

pub fn make_delete_note_endpoint<S>(
    service: Arc<S>,
) -> Endpoint<DeleteNoteRequest, DeleteNoteResponse>
where
    S: NoteService + ?Sized + 'static,
{
    Endpoint::new(move |ctx, req: DeleteNoteRequest| {
        let service = Arc::clone(&service);
        async move {
            let (_, err) = embed(service.delete_note(&ctx, &req.id).await)?;
            Ok(DeleteNoteResponse { err })
        }
    })
}

fn unit_outcome(err: Option<ServiceError>) -> Result<(), ServiceError> {
    err.map_or(Ok(()), Err)
}

#[async_trait]
impl NoteService for Endpoints {
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError> {
        let resp = self
            .post_note
            .call(ctx.clone(), PostNoteRequest { note })
            .await?;
        unit_outcome(resp.err)
    }

    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError> {
        let resp = self
            .get_note
            .call(ctx.clone(), GetNoteRequest { id: id.to_string() })
            .await?;
        if let Some(err) = resp.err {
            return Err(err);
        }
        resp.note.ok_or_else(|| {
            EndpointError::Decode("response carried neither a note nor an error".to_string())
                .into()
        })
    }

    async fn put_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        let req = PutNoteRequest {
            id: id.to_string(),
            note,
        };
        let resp = self.put_note.call(ctx.clone(), req).await?;
        unit_outcome(resp.err)
    }

    async fn patch_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        let req = PatchNoteRequest {
            id: id.to_string(),
            note,
        };
        let resp = self.patch_note.call(ctx.clone(), req).await?;
        unit_outcome(resp.err)
    }

    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError> {
        let resp = self
            .delete_note
            .call(ctx.clone(), DeleteNoteRequest { id: id.to_string() })
            .await?;
        unit_outcome(resp.err)
    }
}
