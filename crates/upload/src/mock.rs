//! Scripted in-memory remote used by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use panup_api::ApiError;
use panup_protocol::{
    AsyncResultResponse, CompleteUploadResponse, CreateFileRequest, CreateFileResponse,
    FileInfo, UploadedPart,
};
use panup_transfer::ContentDigest;

use crate::remote::{RemoteApi, RemoteFuture};

/// A failure the mock can be told to return.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Transport(&'static str),
    Server(i64, &'static str),
    Unauthorized,
}

impl Failure {
    fn into_api(self) -> ApiError {
        match self {
            Failure::Transport(m) => ApiError::Transport(m.into()),
            Failure::Server(code, m) => ApiError::Server {
                code,
                message: m.into(),
            },
            Failure::Unauthorized => ApiError::Unauthorized {
                message: "token expired".into(),
            },
        }
    }
}

/// Call counters.
#[derive(Debug, Clone, Default)]
pub(crate) struct Calls {
    pub create: usize,
    pub get_upload_url: usize,
    pub put_chunk: usize,
    pub list_parts: usize,
    pub complete: usize,
    pub async_result: usize,
    pub find_file: usize,
}

#[derive(Default)]
struct State {
    calls: Calls,
    create_requests: Vec<CreateFileRequest>,
    create_response: Option<CreateFileResponse>,
    create_failure: Option<Failure>,
    url_failures: HashMap<u32, VecDeque<Failure>>,
    put_failures: HashMap<u32, VecDeque<Failure>>,
    targets: Vec<(u32, String)>,
    received: BTreeMap<u32, Bytes>,
    corrupt: HashSet<u32>,
    dropped: HashSet<u32>,
    list_failure: Option<Failure>,
    complete_response: Option<CompleteUploadResponse>,
    async_results: VecDeque<Result<AsyncResultResponse, Failure>>,
    existing: HashSet<(i64, String)>,
    put_delay: Option<Duration>,
    in_flight: usize,
    peak_in_flight: usize,
    async_delay: Option<Duration>,
}

/// Recording remote with scripted answers.
///
/// Defaults: create answers with a chunked session (`pre-1`, 4-byte slices),
/// every chunk push succeeds, parts are reported with the MD5 of the bytes
/// received, and completion finishes synchronously with file id 1001.
pub(crate) struct MockRemote {
    state: Mutex<State>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn set_create_response(&self, resp: CreateFileResponse) {
        self.state.lock().unwrap().create_response = Some(resp);
    }

    pub fn fail_create(&self, failure: Failure) {
        self.state.lock().unwrap().create_failure = Some(failure);
    }

    pub fn fail_url(&self, slice: u32, failure: Failure) {
        let mut s = self.state.lock().unwrap();
        s.url_failures.entry(slice).or_default().push_back(failure);
    }

    pub fn fail_put(&self, slice: u32, failure: Failure) {
        let mut s = self.state.lock().unwrap();
        s.put_failures.entry(slice).or_default().push_back(failure);
    }

    /// Makes the remote report a wrong digest for `slice`.
    pub fn corrupt_part(&self, slice: u32) {
        self.state.lock().unwrap().corrupt.insert(slice);
    }

    /// Makes the remote forget `slice` after accepting it.
    pub fn drop_part(&self, slice: u32) {
        self.state.lock().unwrap().dropped.insert(slice);
    }

    pub fn fail_list(&self, failure: Failure) {
        self.state.lock().unwrap().list_failure = Some(failure);
    }

    pub fn set_complete_response(&self, resp: CompleteUploadResponse) {
        self.state.lock().unwrap().complete_response = Some(resp);
    }

    pub fn push_async_result(&self, completed: bool, file_id: i64) {
        self.state
            .lock()
            .unwrap()
            .async_results
            .push_back(Ok(AsyncResultResponse { completed, file_id }));
    }

    pub fn push_async_failure(&self, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .async_results
            .push_back(Err(failure));
    }

    pub fn add_existing(&self, parent_id: i64, name: &str) {
        self.state
            .lock()
            .unwrap()
            .existing
            .insert((parent_id, name.to_string()));
    }

    /// Makes every chunk push take `delay`.
    pub fn delay_puts(&self, delay: Duration) {
        self.state.lock().unwrap().put_delay = Some(delay);
    }

    /// Makes every async-result poll take `delay`.
    pub fn delay_async_results(&self, delay: Duration) {
        self.state.lock().unwrap().async_delay = Some(delay);
    }

    /// Most chunk pushes seen in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().unwrap().peak_in_flight
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn create_requests(&self) -> Vec<CreateFileRequest> {
        self.state.lock().unwrap().create_requests.clone()
    }

    /// Targets handed out, in request order.
    pub fn targets(&self) -> Vec<(u32, String)> {
        self.state.lock().unwrap().targets.clone()
    }

    /// Bytes accepted per slice.
    pub fn received(&self) -> BTreeMap<u32, Bytes> {
        self.state.lock().unwrap().received.clone()
    }
}

fn slice_of(target: &str) -> u32 {
    target
        .rsplit('/')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

impl RemoteApi for MockRemote {
    fn create_file<'a>(
        &'a self,
        req: &'a CreateFileRequest,
    ) -> RemoteFuture<'a, CreateFileResponse> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.create += 1;
            s.create_requests.push(req.clone());
            if let Some(f) = s.create_failure.take() {
                return Err(f.into_api());
            }
            Ok(s.create_response.clone().unwrap_or(CreateFileResponse {
                file_id: 0,
                preupload_id: "pre-1".into(),
                reuse: false,
                slice_size: 4,
            }))
        })
    }

    fn get_upload_url<'a>(
        &'a self,
        preupload_id: &'a str,
        slice_no: u32,
    ) -> RemoteFuture<'a, String> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.get_upload_url += 1;
            if let Some(f) = s.url_failures.get_mut(&slice_no).and_then(VecDeque::pop_front) {
                return Err(f.into_api());
            }
            let n = s.calls.get_upload_url;
            let target = format!("https://upload.mock/{preupload_id}/{slice_no}/{n}");
            s.targets.push((slice_no, target.clone()));
            Ok(target)
        })
    }

    fn put_chunk<'a>(&'a self, target: &'a str, data: Bytes) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let slice = slice_of(target);
            let delay = {
                let mut s = self.state.lock().unwrap();
                s.in_flight += 1;
                s.peak_in_flight = s.peak_in_flight.max(s.in_flight);
                s.put_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut s = self.state.lock().unwrap();
            s.in_flight -= 1;
            s.calls.put_chunk += 1;
            if let Some(f) = s.put_failures.get_mut(&slice).and_then(VecDeque::pop_front) {
                return Err(f.into_api());
            }
            s.received.insert(slice, data);
            Ok(())
        })
    }

    fn list_upload_parts<'a>(
        &'a self,
        _preupload_id: &'a str,
    ) -> RemoteFuture<'a, Vec<UploadedPart>> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.list_parts += 1;
            if let Some(f) = s.list_failure.take() {
                return Err(f.into_api());
            }
            let parts = s
                .received
                .iter()
                .filter(|(slice, _)| !s.dropped.contains(slice))
                .map(|(&slice, data)| {
                    let etag = if s.corrupt.contains(&slice) {
                        ContentDigest::of(b"corrupted in transit").to_hex()
                    } else {
                        ContentDigest::of(data).to_hex()
                    };
                    UploadedPart {
                        part_number: slice,
                        size: data.len() as u64,
                        etag,
                    }
                })
                .collect();
            Ok(parts)
        })
    }

    fn complete_upload<'a>(
        &'a self,
        _preupload_id: &'a str,
    ) -> RemoteFuture<'a, CompleteUploadResponse> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.complete += 1;
            Ok(s.complete_response.clone().unwrap_or(CompleteUploadResponse {
                file_id: 1001,
                is_async: false,
                completed: true,
            }))
        })
    }

    fn upload_async_result<'a>(
        &'a self,
        _preupload_id: &'a str,
    ) -> RemoteFuture<'a, AsyncResultResponse> {
        Box::pin(async move {
            let delay = self.state.lock().unwrap().async_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut s = self.state.lock().unwrap();
            s.calls.async_result += 1;
            match s.async_results.pop_front() {
                Some(Ok(r)) => Ok(r),
                Some(Err(f)) => Err(f.into_api()),
                None => Ok(AsyncResultResponse::default()),
            }
        })
    }

    fn find_file<'a>(
        &'a self,
        parent_id: i64,
        filename: &'a str,
    ) -> RemoteFuture<'a, Option<FileInfo>> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.calls.find_file += 1;
            let found = s.existing.contains(&(parent_id, filename.to_string()));
            Ok(found.then(|| FileInfo {
                file_id: 500,
                filename: filename.to_string(),
                file_type: 0,
                size: 0,
                etag: String::new(),
                parent_file_id: parent_id,
            }))
        })
    }
}
