use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use senti::{Analysis, Analyzer, SentiError};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::view::View;

/// State shared by all requests. Both members are read-only after start-up.
#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<Analyzer>,
    view: Arc<View>,
}

impl AppState {
    pub fn new(analyzer: Analyzer) -> Result<Self, minijinja::Error> {
        Ok(Self {
            analyzer: Arc::new(analyzer),
            view: Arc::new(View::new()?),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SentimentForm {
    user_text: Option<String>,
}

#[derive(Debug)]
pub enum AppError {
    Analysis(SentiError),
    Render(minijinja::Error),
    Task(tokio::task::JoinError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Analysis(e) => write!(f, "analysis failed: {e}"),
            Self::Render(e) => write!(f, "rendering failed: {e}"),
            Self::Task(e) => write!(f, "scoring task failed: {e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<SentiError> for AppError {
    fn from(error: SentiError) -> Self {
        Self::Analysis(error)
    }
}

impl From<minijinja::Error> for AppError {
    fn from(error: minijinja::Error) -> Self {
        Self::Render(error)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Creates the router serving the form at `/`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_form).post(submit_form))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn show_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    Ok(Html(state.view.render(&Analysis::default())?))
}

async fn submit_form(
    State(state): State<AppState>,
    form: Result<Form<SentimentForm>, FormRejection>,
) -> Result<Html<String>, AppError> {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!(%rejection, "unreadable form, treating as empty");
            SentimentForm::default()
        }
    };
    let analyzer = Arc::clone(&state.analyzer);
    let analysis =
        tokio::task::spawn_blocking(move || analyzer.analyze(form.user_text.as_deref()))
            .await??;
    if let Some(result) = analysis.result.as_ref() {
        tracing::debug!(
            label = %analysis.label,
            compound = result.compound(),
            custom = result.custom(),
            "analyzed"
        );
    }
    Ok(Html(state.view.render(&analysis)?))
}
