use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::api;
use crate::core::{config::Settings, redis::RedisHandle, state::AppState};
use crate::db::models::{
    Exam, Question, QuestionKind, QuestionOption, Student, StudentSubmission, SubmissionAnswer,
};
use crate::db::types::QuestionType;
use crate::db::{Database, Snapshot};
use crate::services::queue::{
    CorrectionJob, GradingJobPayload, QueuePublisher, QueueTransport, TransportError,
};

pub(crate) const CLASS_ID: &str = "CS101-2025-1";
pub(crate) const OTHER_CLASS_ID: &str = "CS202-2025-1";
pub(crate) const CLOSED_EXAM_ID: &str = "exam-closed";
pub(crate) const TEST_GEMINI_KEY: &str = "test-gemini-key";
const TEST_MODEL: &str = "gemini-2.5-flash";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("TUTOR_ENV", "test");
    std::env::remove_var("ENVIRONMENT");
    std::env::set_var("TUTOR_STRICT_CONFIG", "0");
    std::env::set_var("TUTOR_DATA_PATH", "");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::set_var("REDIS_PORT", "6379");
    std::env::set_var("REDIS_DB", "1");
    std::env::remove_var("REDIS_PASSWORD");
    std::env::set_var("QUEUE_TRANSPORT", "http");
    std::env::remove_var("QUEUE_TOKEN");
    std::env::remove_var("GRADING_WEBHOOK_URL");
    std::env::remove_var("QUEUE_BASE_URL");
    std::env::set_var("QUEUE_NAME", "grading-jobs");
    std::env::remove_var("GEMINI_API_KEY");
    std::env::remove_var("GEMINI_BASE_URL");
    std::env::set_var("AI_MAX_RETRIES", "0");
    std::env::set_var("AI_RETRY_BACKOFF_MS", "0");
    std::env::remove_var("WORKER_PACING_DELAY_MS");
    std::env::remove_var("WORKER_DELIVERY_TIMEOUT_SECONDS");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_with(Arc::new(FakeTransport::default()), None).await
}

/// Context over the class fixture; `gemini_base_url` points the backend at a mock
/// server and supplies a key, `None` leaves the backend unconfigured.
pub(crate) async fn setup_test_context_with(
    transport: Arc<FakeTransport>,
    gemini_base_url: Option<String>,
) -> TestContext {
    build_context(transport, gemini_base_url, class_fixture()).await
}

pub(crate) async fn setup_closed_context(answers: &[&str], question_count: usize) -> TestContext {
    build_context(
        Arc::new(FakeTransport::default()),
        None,
        closed_exam_fixture(answers, question_count),
    )
    .await
}

async fn build_context(
    transport: Arc<FakeTransport>,
    gemini_base_url: Option<String>,
    db: Database,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    if let Some(base_url) = gemini_base_url {
        std::env::set_var("GEMINI_API_KEY", TEST_GEMINI_KEY);
        std::env::set_var("GEMINI_BASE_URL", base_url);
    }

    let settings = Settings::load().expect("settings");
    let redis = RedisHandle::new(settings.redis().redis_url());
    let state = AppState::new(settings, db, redis, QueuePublisher::new(transport));
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

/// Test settings with `vars` layered on top; the guard keeps the environment stable.
pub(crate) async fn load_settings(vars: &[(&str, &str)]) -> (OwnedMutexGuard<()>, Settings) {
    let guard = env_lock().await;
    set_test_env();
    for (name, value) in vars {
        std::env::set_var(name, value);
    }

    (guard, Settings::load().expect("settings"))
}

/// State over an in-memory snapshot with an always-succeeding fake queue.
pub(crate) fn state_for(settings: Settings, snapshot: Snapshot) -> AppState {
    let redis = RedisHandle::new(settings.redis().redis_url());
    AppState::new(
        settings,
        Database::in_memory(snapshot),
        redis,
        QueuePublisher::new(Arc::new(FakeTransport::default())),
    )
}

fn open_question(id: &str, statement: &str, reference: &str) -> Question {
    Question {
        id: id.to_string(),
        topic: "Ownership".to_string(),
        statement: statement.to_string(),
        kind: QuestionKind::Open { reference_answer: reference.to_string() },
    }
}

fn closed_question(id: &str) -> Question {
    Question {
        id: id.to_string(),
        topic: "Basics".to_string(),
        statement: format!("Statement {id}"),
        kind: QuestionKind::Closed {
            options: vec![
                QuestionOption { id: "1".to_string(), text: "True".to_string(), is_correct: true },
                QuestionOption {
                    id: "2".to_string(),
                    text: "False".to_string(),
                    is_correct: false,
                },
            ],
        },
    }
}

fn answer(question_id: &str, text: &str) -> SubmissionAnswer {
    SubmissionAnswer { question_id: question_id.to_string(), answer: text.to_string(), grade: None }
}

/// One class with one exam (two open questions and one closed) and a single
/// submission answering everything; a second class keeps class filtering honest.
pub(crate) fn class_fixture() -> Database {
    Database::in_memory(Snapshot {
        students: vec![
            Student { id: "st-1".to_string(), name: "Grace Hopper".to_string() },
            Student { id: "st-2".to_string(), name: "Alan Turing".to_string() },
        ],
        exams: vec![
            Exam {
                id: "exam-1".to_string(),
                class_id: CLASS_ID.to_string(),
                title: "Rust midterm".to_string(),
                is_valid: true,
                open_questions: 2,
                closed_questions: 1,
                question_ids: vec![
                    "q-open-1".to_string(),
                    "q-closed-1".to_string(),
                    "q-open-2".to_string(),
                ],
            },
            Exam {
                id: "exam-2".to_string(),
                class_id: OTHER_CLASS_ID.to_string(),
                title: "Systems final".to_string(),
                is_valid: true,
                open_questions: 1,
                closed_questions: 0,
                question_ids: vec!["q-open-1".to_string()],
            },
        ],
        questions: vec![
            open_question(
                "q-open-1",
                "What happens to a value passed by value to a function?",
                "Ownership of the value moves into the function.",
            ),
            open_question(
                "q-open-2",
                "What does the borrow checker prevent?",
                "Aliased mutable access and dangling references.",
            ),
            closed_question("q-closed-1"),
        ],
        submissions: vec![
            StudentSubmission {
                id: "sub-1".to_string(),
                student_id: "st-1".to_string(),
                exam_id: "exam-1".to_string(),
                answers: vec![
                    answer("q-open-1", "Ownership moves to the callee."),
                    answer("q-closed-1", "1"),
                    answer("q-open-2", "Data races and use-after-free."),
                ],
                closed_grade: None,
            },
            StudentSubmission {
                id: "sub-2".to_string(),
                student_id: "st-2".to_string(),
                exam_id: "exam-2".to_string(),
                answers: vec![answer("q-open-1", "It is copied.")],
                closed_grade: None,
            },
        ],
    })
}

/// Closed-only exam with `question_count` questions whose correct option is `"1"`;
/// a single submission answers the first `answers.len()` of them in order.
pub(crate) fn closed_exam_fixture(answers: &[&str], question_count: usize) -> Database {
    let questions: Vec<Question> =
        (1..=question_count).map(|index| closed_question(&format!("cq-{index}"))).collect();

    Database::in_memory(Snapshot {
        students: vec![Student { id: "st-ada".to_string(), name: "Ada Lovelace".to_string() }],
        exams: vec![Exam {
            id: CLOSED_EXAM_ID.to_string(),
            class_id: CLASS_ID.to_string(),
            title: "Quiz".to_string(),
            is_valid: true,
            open_questions: 0,
            closed_questions: question_count as u32,
            question_ids: questions.iter().map(|question| question.id.clone()).collect(),
        }],
        submissions: vec![StudentSubmission {
            id: "sub-closed-1".to_string(),
            student_id: "st-ada".to_string(),
            exam_id: CLOSED_EXAM_ID.to_string(),
            answers: answers
                .iter()
                .enumerate()
                .map(|(index, text)| answer(&format!("cq-{}", index + 1), text))
                .collect(),
            closed_grade: None,
        }],
        questions,
    })
}

/// `count` independent jobs with question ids `q-1..=q-count`.
pub(crate) fn correction_jobs(count: usize) -> Vec<CorrectionJob> {
    (1..=count)
        .map(|index| CorrectionJob {
            submission_id: format!("sub-{index}"),
            exam_id: "exam-1".to_string(),
            class_id: CLASS_ID.to_string(),
            question_id: format!("q-{index}"),
            question_text: format!("Question {index}"),
            student_answer: format!("Answer {index}"),
            correct_answer: format!("Reference {index}"),
            model: TEST_MODEL.to_string(),
            question_type: QuestionType::Open,
        })
        .collect()
}

/// The job the orchestrator would publish for `sub-1` / `q-open-1` of the class fixture.
pub(crate) fn correction_job_for_fixture() -> CorrectionJob {
    CorrectionJob {
        submission_id: "sub-1".to_string(),
        exam_id: "exam-1".to_string(),
        class_id: CLASS_ID.to_string(),
        question_id: "q-open-1".to_string(),
        question_text: "What happens to a value passed by value to a function?".to_string(),
        student_answer: "Ownership moves to the callee.".to_string(),
        correct_answer: "Ownership of the value moves into the function.".to_string(),
        model: TEST_MODEL.to_string(),
        question_type: QuestionType::Open,
    }
}

pub(crate) fn webhook_payload() -> GradingJobPayload {
    correction_job_for_fixture().into()
}

/// In-memory queue transport that records what it accepted.
#[derive(Default)]
pub(crate) struct FakeTransport {
    failing_questions: HashSet<String>,
    missing: Option<&'static str>,
    unavailable: bool,
    calls: AtomicUsize,
    published: StdMutex<Vec<CorrectionJob>>,
}

impl FakeTransport {
    pub(crate) fn failing_questions(question_ids: &[&str]) -> Self {
        Self {
            failing_questions: question_ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    pub(crate) fn missing(setting: &'static str) -> Self {
        Self { missing: Some(setting), ..Self::default() }
    }

    pub(crate) fn published(&self) -> Vec<CorrectionJob> {
        self.published.lock().expect("published lock").clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueTransport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn missing_setting(&self) -> Option<&'static str> {
        self.missing
    }

    async fn ensure_available(&self) -> Result<(), TransportError> {
        if self.unavailable {
            Err(TransportError::Unavailable("fake transport offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn enqueue(&self, job: &CorrectionJob) -> Result<String, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_questions.contains(&job.question_id) {
            return Err(TransportError::Rejected { status: 500, body: "injected".to_string() });
        }

        self.published.lock().expect("published lock").push(job.clone());
        Ok(format!("msg-{call}"))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) path: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: serde_json::Value,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }
}

struct MockState {
    status: StatusCode,
    reply: serde_json::Value,
    requests: StdMutex<Vec<RecordedRequest>>,
}

/// Local HTTP server answering every request with one canned JSON reply.
pub(crate) struct MockServer {
    addr: std::net::SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn replying(status: StatusCode, reply: serde_json::Value) -> Self {
        let state = Arc::new(MockState { status, reply, requests: StdMutex::new(Vec::new()) });
        let app = Router::new().fallback(record_and_reply).with_state(state.clone());
        let (addr, handle) = serve_locally(app).await;

        Self { addr, state, handle }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn hits(&self) -> usize {
        self.state.requests.lock().expect("requests lock").len()
    }

    pub(crate) fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().expect("requests lock").last().cloned()
    }

    pub(crate) fn last_api_key(&self) -> Option<String> {
        self.last_request().and_then(|request| request.header("x-goog-api-key"))
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The API router served over real HTTP, for callers that reach it through a URL.
pub(crate) struct LiveApi {
    addr: std::net::SocketAddr,
    handle: JoinHandle<()>,
}

impl LiveApi {
    pub(crate) async fn start(state: AppState) -> Self {
        let (addr, handle) = serve_locally(api::router::router(state)).await;
        Self { addr, handle }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for LiveApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_locally(app: Router) -> (std::net::SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind local server");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::warn!(error = %err, "local server stopped");
        }
    });

    (addr, handle)
}

async fn record_and_reply(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

    state.requests.lock().expect("requests lock").push(RecordedRequest {
        path: uri.path().to_string(),
        headers,
        body,
    });

    (state.status, Json(state.reply.clone()))
}

/// A `generateContent` reply whose single candidate says `text`.
pub(crate) fn gemini_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
