//! HTTP Server for the rowwise API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/run`        | Upload CSV and run an instruction    |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{Json, Sse, sse::Event},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, RunResponse};
use crate::ai::GeneratorConfig;
use crate::error::{GenerationResult, PipelineError, ServerError, ServerResult};
use crate::transform::batch::{BatchOptions, BatchProcessor, MAX_CONCURRENCY};
use crate::transform::pipeline::{run_bytes, RunRequest};
use crate::transform::row::RowTransformer;

/// Builds the transformer for one run.
pub type TransformerFactory = Arc<dyn Fn() -> GenerationResult<RowTransformer> + Send + Sync>;

/// Router whose runs use the generator configured from the environment.
pub fn router() -> Router {
    router_with(Arc::new(|| {
        GeneratorConfig::from_env().and_then(|config| RowTransformer::from_config(&config))
    }))
}

/// Router whose runs get their transformer from `factory`.
pub fn router_with(factory: TransformerFactory) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/run", post(run_upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(factory)
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Rowwise server running on http://localhost:{}", port);
    println!("   POST /api/run    - Upload CSV and run an instruction");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /health     - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "rowwise",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "run": "POST /api/run",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields of a `/api/run` upload
#[derive(Debug, Default)]
struct RunForm {
    file: Option<Vec<u8>>,
    file_name: Option<String>,
    column: String,
    instruction: String,
    concurrency: Option<usize>,
}

impl RunForm {
    fn set_text(&mut self, name: &str, value: String) -> ServerResult<()> {
        match name {
            "column" => self.column = value,
            "instruction" => self.instruction = value,
            "concurrency" => {
                let n = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ServerError::BadRequest(format!("Invalid concurrency: {}", value)))?;
                if n > MAX_CONCURRENCY {
                    return Err(ServerError::BadRequest(format!(
                        "Concurrency {} exceeds the maximum of {}",
                        n, MAX_CONCURRENCY
                    )));
                }
                self.concurrency = Some(n.max(1));
            }
            _ => {}
        }
        Ok(())
    }

    fn request(&self) -> RunRequest {
        RunRequest::new(self.column.as_str(), self.instruction.as_str())
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency.unwrap_or(1),
            ..BatchOptions::default()
        }
    }
}

/// Run endpoint
async fn run_upload(
    State(factory): State<TransformerFactory>,
    mut multipart: Multipart,
) -> Result<Json<RunResponse>, (StatusCode, Json<Value>)> {
    let mut form = RunForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| reject(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            form.file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| reject(ServerError::BadRequest(format!("Read error: {}", e))))?;
            form.file = Some(bytes.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| reject(ServerError::BadRequest(format!("Read error: {}", e))))?;
            form.set_text(&name, value).map_err(reject)?;
        }
    }

    handle_run(form, factory.as_ref()).await.map(Json).map_err(reject)
}

async fn handle_run(
    form: RunForm,
    factory: &(dyn Fn() -> GenerationResult<RowTransformer> + Send + Sync),
) -> ServerResult<RunResponse> {
    // Bad input is reported before any generator is configured
    if form.file.is_none() {
        return Err(ServerError::BadRequest("No file provided".to_string()));
    }
    form.request().validate().map_err(PipelineError::from)?;

    let transformer = factory().map_err(PipelineError::from)?;

    execute(form, transformer).await
}

async fn execute(form: RunForm, transformer: RowTransformer) -> ServerResult<RunResponse> {
    let bytes = form
        .file
        .as_deref()
        .ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW RUN: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    );
    println!("{}\n", "=".repeat(70));

    let processor = BatchProcessor::new(transformer, form.options());
    let output = run_bytes(bytes, &form.request(), &processor, None).await?;
    log_info(format!(
        "📊 {} rows: {} succeeded, {} skipped, {} failed",
        output.summary.total, output.summary.succeeded, output.summary.skipped, output.summary.failed
    ));

    RunResponse::try_from(output).map_err(|e| ServerError::Pipeline(PipelineError::Serialization(e)))
}

fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ServerError) -> (StatusCode, Json<Value>) {
    log_error(format!("Run error: {}", err));
    (status_for(&err), Json(error_response(&err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, PreconditionError, ResolveError};
    use crate::transform::testing::StubGenerator;

    fn form(file: &[u8], column: &str, instruction: &str) -> RunForm {
        RunForm {
            file: Some(file.to_vec()),
            file_name: Some("notes.csv".to_string()),
            column: column.to_string(),
            instruction: instruction.to_string(),
            concurrency: None,
        }
    }

    fn stub_transformer() -> RowTransformer {
        RowTransformer::new(Arc::new(StubGenerator::summarizer()), &GeneratorConfig::default())
    }

    fn stub_factory() -> TransformerFactory {
        Arc::new(|| Ok(stub_transformer()))
    }

    fn keyless_factory() -> TransformerFactory {
        Arc::new(|| Err(GenerationError::MissingApiKey("OPENAI_API_KEY not set".into())))
    }

    async fn spawn_server(factory: TransformerFactory) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router_with(factory)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    const BOUNDARY: &str = "rowwise-test-boundary";

    /// multipart/form-data body with optional CSV file part
    fn multipart_body(file: Option<&str>, fields: &[(&str, &str)]) -> String {
        let mut body = String::new();
        if let Some(csv) = file {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.csv\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
                BOUNDARY, csv
            ));
        }
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    async fn post_run(base: &str, body: String) -> (reqwest::StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/api/run", base))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_upload_through_router() {
        let base = spawn_server(stub_factory()).await;
        let body = multipart_body(
            Some("ID,Notes\n1,aspirin\n2,\n3,ibuprofen\n"),
            &[("column", "B"), ("instruction", "Summarize"), ("concurrency", "2")],
        );

        let (status, json) = post_run(&base, body).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["summary"]["concurrency"], 2);
        assert_eq!(
            json["csv"],
            "ID,Notes,Result\n1,aspirin,<SUMMARY:aspirin>\n2,,\n3,ibuprofen,<SUMMARY:ibuprofen>\n"
        );
        assert_eq!(json["results"][1]["status"], "skipped");
    }

    #[tokio::test]
    async fn test_router_rejects_oversized_concurrency() {
        let base = spawn_server(stub_factory()).await;
        let too_many = (MAX_CONCURRENCY + 1).to_string();
        let body = multipart_body(
            Some("ID,Notes\n1,x\n"),
            &[("column", "B"), ("instruction", "Summarize"), ("concurrency", too_many.as_str())],
        );

        let (status, json) = post_run(&base, body).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_router_missing_file_without_key_is_bad_request() {
        let base = spawn_server(keyless_factory()).await;
        let body = multipart_body(None, &[("column", "B"), ("instruction", "Summarize")]);

        let (status, json) = post_run(&base, body).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid request: No file provided");
    }

    #[tokio::test]
    async fn test_execute_runs_upload() {
        let mut f = form(b"ID,Notes\n1,aspirin\n", "Notes", "Summarize");
        f.set_text("concurrency", "2".to_string()).unwrap();

        let response = execute(f, stub_transformer()).await.unwrap();
        assert_eq!(response.status, "ready");
        assert_eq!(response.summary.concurrency, 2);
        assert_eq!(response.csv, "ID,Notes,Result\n1,aspirin,<SUMMARY:aspirin>\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let mut f = form(b"", "B", "Summarize");
        f.file = None;

        let err = execute(f, stub_transformer()).await.unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_checked_before_generator() {
        let mut f = form(b"", "B", "Summarize");
        f.file = None;

        let err = handle_run(f, keyless_factory().as_ref()).await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_column_is_bad_request() {
        let err = execute(form(b"ID,Notes\n1,x\n", "Comment", "Summarize"), stub_transformer())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServerError::Pipeline(PipelineError::Resolve(ResolveError::ColumnNotFound { .. }))
        ));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_instruction_rejected_without_generator() {
        let err = handle_run(form(b"ID,Notes\n1,x\n", "B", "  "), keyless_factory().as_ref())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServerError::Pipeline(PipelineError::Precondition(PreconditionError::MissingInstruction))
        ));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_form_fields() {
        let mut f = RunForm::default();
        f.set_text("column", "B".to_string()).unwrap();
        f.set_text("instruction", "Translate".to_string()).unwrap();
        f.set_text("unknown", "ignored".to_string()).unwrap();
        assert!(f.set_text("concurrency", "many".to_string()).is_err());

        assert_eq!(f.request().column, "B");
        assert_eq!(f.request().instruction, "Translate");
        assert_eq!(f.options().concurrency, 1);

        f.set_text("concurrency", MAX_CONCURRENCY.to_string()).unwrap();
        assert_eq!(f.options().concurrency, MAX_CONCURRENCY);

        let err = f.set_text("concurrency", "1000000000".to_string()).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        assert_eq!(f.options().concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn test_server_errors_are_internal() {
        let err = ServerError::Pipeline(PipelineError::Generator(GenerationError::MissingApiKey(
            "OPENAI_API_KEY not set".into(),
        )));
        assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
