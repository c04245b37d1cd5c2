//! HTTP inspection endpoint
//!
//! Serves the plain-text status report on the secret path and 404 elsewhere.

use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use ingest::{RecordStore, Route, StateStore, StatusReport, route};
use log::{debug, error, info};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Stores read by the status report
#[derive(Clone)]
pub struct InspectState {
    pub records: Arc<dyn RecordStore>,
    pub state: Arc<dyn StateStore>,
    pub magic_path: Arc<str>,
}

pub async fn serve(addr: SocketAddr, inspect: InspectState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind inspection endpoint to {}", addr))?;
    info!("Inspection endpoint listening on http://{}", addr);

    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                }
                Ok(()) | Err(_) => continue,
            },
        };

        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let inspect = inspect.clone();
        joinset.spawn(async move {
            let service = service_fn(move |req| handle(req, inspect.clone()));
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }
}

async fn handle(
    req: Request<Incoming>,
    inspect: InspectState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!("{} {}", req.method(), req.uri().path());

    if route(req.uri().path(), &inspect.magic_path) == Route::NotFound {
        return Ok(text(StatusCode::NOT_FOUND, "Not found".to_string()));
    }

    let report = tokio::task::spawn_blocking(move || {
        StatusReport::collect(inspect.records.as_ref(), inspect.state.as_ref())
    })
    .await;

    let response = match report {
        Ok(Ok(report)) => text(StatusCode::OK, report.render()),
        Ok(Err(e)) => {
            error!("Failed to collect status report: {:#}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
        }
        Err(e) => {
            error!("Status report task failed: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
        }
    };
    Ok(response)
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
