use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::Html;
use axum::routing::get;
use axum::{Form, Router};
use ledgerlink_core::LinkToken;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::LinkError;
use crate::page;

/// Callback bodies are a single short form field.
const MAX_BODY_SIZE: usize = 16 * 1024;

/// How long in-flight requests get to finish once the flow has resolved.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// First-time link of a new institution.
    Link,
    /// Update-mode repair of an existing item.
    Relink,
}

impl Flow {
    pub fn path(self) -> &'static str {
        match self {
            Flow::Link => "/link",
            Flow::Relink => "/relink",
        }
    }

    fn interpret(self, form: CallbackForm) -> Delivery {
        if let Some(error) = non_empty(form.error) {
            return Err(LinkError::Callback(error));
        }
        match self {
            Flow::Link => non_empty(form.public_token)
                .map(CallbackOutcome::PublicToken)
                .ok_or_else(|| LinkError::Callback("empty public_token".to_string())),
            Flow::Relink => Ok(CallbackOutcome::Relinked),
        }
    }
}

/// What the browser page reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Fresh link succeeded; the token still has to be exchanged.
    PublicToken(String),
    Relinked,
}

type Delivery = Result<CallbackOutcome, LinkError>;

#[derive(Debug, Default, Deserialize)]
struct CallbackForm {
    #[serde(default)]
    public_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Clone)]
struct CallbackState {
    flow: Flow,
    page: Arc<str>,
    resolver: Arc<Mutex<Option<oneshot::Sender<Delivery>>>>,
}

impl CallbackState {
    /// Resolves the flow. Only the first delivery counts; returns false for
    /// every later one.
    fn deliver(&self, delivery: Delivery) -> bool {
        let sender = match self.resolver.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(delivery).is_ok(),
            None => false,
        }
    }
}

async fn serve_page(State(state): State<CallbackState>) -> Html<String> {
    Html(state.page.to_string())
}

async fn receive_callback(
    State(state): State<CallbackState>,
    form: Result<Form<CallbackForm>, FormRejection>,
) -> StatusCode {
    let delivery = match form {
        Ok(Form(form)) => state.flow.interpret(form),
        Err(rejection) => Err(LinkError::Protocol(format!("malformed callback body: {rejection}"))),
    };
    let status = match &delivery {
        Err(LinkError::Protocol(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    if !state.deliver(delivery) {
        tracing::debug!(path = state.flow.path(), "Ignoring callback for an already resolved flow");
    }
    status
}

async fn reject_method(State(state): State<CallbackState>, method: Method) -> StatusCode {
    state.deliver(Err(LinkError::Protocol(format!(
        "{method} is not supported on {}",
        state.flow.path()
    ))));
    StatusCode::METHOD_NOT_ALLOWED
}

/// Routes for one flow plus the receiving end of its single resolution.
fn router(flow: Flow, token: &LinkToken) -> (Router, oneshot::Receiver<Delivery>) {
    let (tx, rx) = oneshot::channel();
    let state = CallbackState {
        flow,
        page: Arc::from(page::render(flow, token)),
        resolver: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route(
            flow.path(),
            get(serve_page).post(receive_callback).fallback(reject_method),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http());
    (app, rx)
}

/// Short-lived loopback listener hosting one link or relink page.
pub struct CallbackServer {
    flow: Flow,
    local_addr: SocketAddr,
    outcome: oneshot::Receiver<Delivery>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Binds `127.0.0.1:port` and starts serving. Port 0 picks a free port.
    pub async fn start(port: u16, flow: Flow, token: &LinkToken) -> Result<Self, LinkError> {
        let (app, outcome) = router(flow, token);
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
            .map_err(|source| LinkError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| LinkError::Bind { port, source })?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::warn!(error = %e, "Link server stopped with an error");
            }
        });

        tracing::info!(%local_addr, path = flow.path(), "Link server listening");
        Ok(CallbackServer {
            flow,
            local_addr,
            outcome,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address the user's browser should open.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.flow.path())
    }

    /// Waits for the page to report back, then stops the listener. The
    /// listener is always released, whether the flow succeeded, failed or
    /// timed out.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackOutcome, LinkError> {
        let CallbackServer {
            outcome,
            shutdown,
            mut task,
            ..
        } = self;

        let result = match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(LinkError::Closed),
            Err(_) => Err(LinkError::TimedOut(timeout.as_secs())),
        };

        let _ = shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::debug!("Link server did not drain in time, aborting");
            task.abort();
            let _ = task.await;
        }
        result
    }
}
