//! The `env.http_fetch` host capability.
//!
//! A sandboxed worker performs outbound HTTP by calling one imported
//! function. Its parameters are fourteen `i32` slots:
//!
//! | slots | meaning |
//! |---|---|
//! | 0, 1 | url (ptr, len) |
//! | 2, 3 | method (ptr, len) |
//! | 4, 5 | request body (ptr, len) |
//! | 6 | timeout in milliseconds, `<= 0` selects the default |
//! | 7 | status cell |
//! | 8, 9, 10 | response body (ptr, capacity, length cell) |
//! | 11, 12, 13 | error text (ptr, capacity, length cell) |
//!
//! The return value is [`HOST_OK`] when the result fields were written (the
//! exchange itself may still have failed, see the error length) or
//! [`HOST_FAULT`] when guest memory could not be accessed and no result
//! field is trustworthy.

use std::sync::Arc;
use std::time::Duration;

use aria_core::{DEFAULT_FETCH_TIMEOUT, FetchRequest, FetchResult, Fetcher, HostCallGate};
use tracing::{debug, error, warn};
use wasmtime::{Caller, Extern, Linker};

use crate::context::ModuleState;
use crate::error::{SandboxError, SandboxResult};
use crate::memory::{GuestBuffer, GuestRegion, MemoryFault, read_bytes, read_string, write_truncated, write_u32};

/// Import module name.
pub const IMPORT_MODULE: &str = "env";
/// Import function name.
pub const IMPORT_NAME: &str = "http_fetch";

/// Result fields were written.
pub const HOST_OK: i32 = 0;
/// A guest memory access failed; nothing written is trustworthy.
pub const HOST_FAULT: i32 = 1;

/// Raw parameters of one `http_fetch` call.
pub type HttpFetchParams = (
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
    i32,
);

/// Decoded layout of one `http_fetch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCall {
    /// Request URL.
    pub url: GuestRegion,
    /// Request method; empty means `GET`.
    pub method: GuestRegion,
    /// Request body.
    pub body: GuestRegion,
    /// Requested timeout in milliseconds.
    pub timeout_millis: i32,
    /// Status output cell.
    pub status_cell: GuestRegion,
    /// Response body output.
    pub body_out: GuestBuffer,
    /// Error text output.
    pub error_out: GuestBuffer,
}

impl FetchCall {
    /// Decode the raw import parameters.
    #[must_use]
    pub fn from_params(params: HttpFetchParams) -> Self {
        let (
            url_ptr,
            url_len,
            method_ptr,
            method_len,
            body_ptr,
            body_len,
            timeout_millis,
            status_ptr,
            out_ptr,
            out_cap,
            out_len_ptr,
            err_ptr,
            err_cap,
            err_len_ptr,
        ) = params;
        Self {
            url: GuestRegion::from_raw(url_ptr, url_len),
            method: GuestRegion::from_raw(method_ptr, method_len),
            body: GuestRegion::from_raw(body_ptr, body_len),
            timeout_millis,
            status_cell: GuestRegion::cell(status_ptr),
            body_out: GuestBuffer::from_raw(out_ptr, out_cap, out_len_ptr),
            error_out: GuestBuffer::from_raw(err_ptr, err_cap, err_len_ptr),
        }
    }

    /// Read the request from guest memory.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryFault`] if url, method or body lie outside memory.
    pub fn read_request(
        &self,
        memory: &[u8],
        default_timeout: Duration,
    ) -> Result<FetchRequest, MemoryFault> {
        let url = read_string(memory, self.url)?;
        let method = read_string(memory, self.method)?;
        let body = if self.body.len == 0 {
            Vec::new()
        } else {
            read_bytes(memory, self.body)?.to_vec()
        };
        Ok(FetchRequest::new(method, url)
            .with_body(body)
            .with_timeout(FetchRequest::resolve_timeout(
                self.timeout_millis,
                default_timeout,
            )))
    }

    /// Write `result` into the output fields.
    ///
    /// All output regions are validated before the first byte is written.
    /// A body larger than its buffer is copied up to capacity, its full
    /// length recorded, and an overflow message written as the error.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryFault`] if any output region lies outside memory.
    pub fn write_result(&self, memory: &mut [u8], result: &FetchResult) -> Result<(), MemoryFault> {
        self.status_cell.resolve(memory.len())?;
        self.body_out.validate(memory.len())?;
        self.error_out.validate(memory.len())?;

        write_u32(memory, self.status_cell, u32::from(result.status))?;

        if let Some(message) = &result.error {
            write_u32(memory, self.body_out.len_cell, 0)?;
            write_truncated(memory, self.error_out, message.as_bytes())?;
            return Ok(());
        }

        write_truncated(memory, self.body_out, &result.body)?;
        if result.body.len() > self.body_out.capacity() {
            let message = format!(
                "response body size ({}) exceeds buffer capacity ({})",
                result.body.len(),
                self.body_out.capacity()
            );
            warn!(
                size = result.body.len(),
                capacity = self.body_out.capacity(),
                "http_fetch response truncated"
            );
            write_truncated(memory, self.error_out, message.as_bytes())?;
        } else {
            write_u32(memory, self.error_out.len_cell, 0)?;
        }
        Ok(())
    }
}

/// Host side of `http_fetch`: permission gate plus fetcher.
pub struct HostFunctionBridge {
    worker: String,
    gate: Arc<dyn HostCallGate>,
    fetcher: Arc<dyn Fetcher>,
    default_timeout: Duration,
}

impl HostFunctionBridge {
    /// Create a bridge for `worker`.
    #[must_use]
    pub fn new(
        worker: impl Into<String>,
        gate: Arc<dyn HostCallGate>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            worker: worker.into(),
            gate,
            fetcher,
            default_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the timeout used when the guest passes a non-positive value.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Timeout used when the guest passes a non-positive value.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Check the gate and perform the request.
    ///
    /// A denial is reported like a transport failure: status 0 and a
    /// `permission denied` error.
    pub async fn perform(&self, request: FetchRequest) -> FetchResult {
        if let Err(reason) = self
            .gate
            .check_http_request(&self.worker, &request.method, &request.url)
            .await
        {
            warn!(worker = %self.worker, method = %request.method, url = %request.url, %reason, "http_fetch denied");
            return FetchResult::transport_failure(format!("permission denied: {reason}"));
        }

        debug!(
            worker = %self.worker,
            method = %request.method,
            url = %request.url,
            timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX),
            "http_fetch executing request"
        );
        let result = self.fetcher.fetch(request).await;
        if let Some(err) = &result.error {
            debug!(worker = %self.worker, status = result.status, error = %err, "http_fetch failed");
        }
        result
    }

    /// Run one complete call against a plain memory slice.
    ///
    /// Returns [`HOST_OK`] or [`HOST_FAULT`].
    pub async fn dispatch(&self, memory: &mut [u8], params: HttpFetchParams) -> i32 {
        let call = FetchCall::from_params(params);
        let request = match call.read_request(memory, self.default_timeout) {
            Ok(request) => request,
            Err(fault) => {
                error!(worker = %self.worker, %fault, "http_fetch could not read request");
                return HOST_FAULT;
            },
        };
        let result = self.perform(request).await;
        match call.write_result(memory, &result) {
            Ok(()) => HOST_OK,
            Err(fault) => {
                error!(worker = %self.worker, %fault, "http_fetch could not write result");
                HOST_FAULT
            },
        }
    }
}

impl std::fmt::Debug for HostFunctionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunctionBridge")
            .field("worker", &self.worker)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Register `env.http_fetch` in `linker`.
///
/// Guest memory is borrowed only while reading the request and while
/// writing the result, never across the network call.
pub(crate) fn add_to_linker(linker: &mut Linker<ModuleState>) -> SandboxResult<()> {
    linker
        .func_wrap_async(
            IMPORT_MODULE,
            IMPORT_NAME,
            |mut caller: Caller<'_, ModuleState>, params: HttpFetchParams| {
                Box::new(async move {
                    let bridge = Arc::clone(caller.data().bridge());
                    let Some(memory) = caller.get_export("memory").and_then(Extern::into_memory)
                    else {
                        error!("http_fetch called by a module without exported memory");
                        return HOST_FAULT;
                    };

                    let call = FetchCall::from_params(params);
                    let request =
                        match call.read_request(memory.data(&caller), bridge.default_timeout()) {
                            Ok(request) => request,
                            Err(fault) => {
                                error!(%fault, "http_fetch could not read request");
                                return HOST_FAULT;
                            },
                        };

                    let result = bridge.perform(request).await;

                    match call.write_result(memory.data_mut(&mut caller), &result) {
                        Ok(()) => HOST_OK,
                        Err(fault) => {
                            error!(%fault, "http_fetch could not write result");
                            HOST_FAULT
                        },
                    }
                })
            },
        )
        .map_err(|e| SandboxError::Link(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::{AllowAllGate, DenyAllGate, HostAllowListGate};
    use aria_test::MockFetcher;

    const URL: &[u8] = b"https://example.org/artist";
    const URL_AT: i32 = 0;
    const METHOD_AT: i32 = 64;
    const REQ_BODY_AT: i32 = 80;
    const STATUS_AT: i32 = 100;
    const BODY_LEN_AT: i32 = 104;
    const ERR_LEN_AT: i32 = 108;
    const BODY_AT: i32 = 128;
    const ERR_AT: i32 = 512;
    const ERR_CAP: i32 = 256;

    fn memory_with(method: &[u8], body: &[u8]) -> Vec<u8> {
        let mut memory = vec![0u8; 1024];
        memory[..URL.len()].copy_from_slice(URL);
        let m = usize::try_from(METHOD_AT).unwrap();
        memory[m..m + method.len()].copy_from_slice(method);
        let b = usize::try_from(REQ_BODY_AT).unwrap();
        memory[b..b + body.len()].copy_from_slice(body);
        memory
    }

    fn params(method_len: i32, body_len: i32, timeout: i32, body_cap: i32) -> HttpFetchParams {
        (
            URL_AT,
            i32::try_from(URL.len()).unwrap(),
            METHOD_AT,
            method_len,
            REQ_BODY_AT,
            body_len,
            timeout,
            STATUS_AT,
            BODY_AT,
            body_cap,
            BODY_LEN_AT,
            ERR_AT,
            ERR_CAP,
            ERR_LEN_AT,
        )
    }

    fn cell(memory: &[u8], at: i32) -> u32 {
        let at = usize::try_from(at).unwrap();
        u32::from_le_bytes(memory[at..at + 4].try_into().unwrap())
    }

    fn bytes(memory: &[u8], at: i32, len: u32) -> &[u8] {
        let at = usize::try_from(at).unwrap();
        &memory[at..at + usize::try_from(len).unwrap()]
    }

    fn bridge(fetcher: &MockFetcher) -> HostFunctionBridge {
        HostFunctionBridge::new("mcp", Arc::new(AllowAllGate), Arc::new(fetcher.clone()))
    }

    #[tokio::test]
    async fn success_writes_status_and_body() {
        let fetcher = MockFetcher::new().with_result(FetchResult::success(200, b"hello".to_vec()));
        let mut memory = memory_with(b"POST", b"q=1");

        let rc = bridge(&fetcher).dispatch(&mut memory, params(4, 3, 1500, 64)).await;

        assert_eq!(rc, HOST_OK);
        assert_eq!(cell(&memory, STATUS_AT), 200);
        assert_eq!(cell(&memory, BODY_LEN_AT), 5);
        assert_eq!(bytes(&memory, BODY_AT, 5), b"hello");
        assert_eq!(cell(&memory, ERR_LEN_AT), 0);

        let sent = &fetcher.requests()[0];
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.url, "https://example.org/artist");
        assert_eq!(sent.body, b"q=1");
        assert_eq!(sent.timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn empty_method_and_zero_timeout_use_defaults() {
        let fetcher = MockFetcher::new();
        let mut memory = memory_with(b"", b"");

        let rc = bridge(&fetcher).dispatch(&mut memory, params(0, 0, 0, 64)).await;

        assert_eq!(rc, HOST_OK);
        let sent = &fetcher.requests()[0];
        assert_eq!(sent.method, "GET");
        assert_eq!(sent.timeout, Duration::from_millis(30_000));
        assert!(sent.body.is_empty());
    }

    #[tokio::test]
    async fn negative_timeout_uses_configured_default() {
        let fetcher = MockFetcher::new();
        let mut memory = memory_with(b"GET", b"");
        let bridge = bridge(&fetcher).with_default_timeout(Duration::from_secs(7));

        bridge.dispatch(&mut memory, params(3, 0, -5, 64)).await;

        assert_eq!(fetcher.requests()[0].timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn oversized_body_is_truncated_with_true_length() {
        let payload: Vec<u8> = (0..100u8).collect();
        let fetcher = MockFetcher::new().with_result(FetchResult::success(200, payload.clone()));
        let mut memory = memory_with(b"GET", b"");

        let rc = bridge(&fetcher).dispatch(&mut memory, params(3, 0, 0, 16)).await;

        assert_eq!(rc, HOST_OK);
        assert_eq!(cell(&memory, STATUS_AT), 200);
        assert_eq!(cell(&memory, BODY_LEN_AT), 100);
        assert_eq!(bytes(&memory, BODY_AT, 16), &payload[..16]);
        assert_eq!(bytes(&memory, BODY_AT + 16, 1), &[0]);
        let err_len = cell(&memory, ERR_LEN_AT);
        assert_eq!(
            bytes(&memory, ERR_AT, err_len),
            b"response body size (100) exceeds buffer capacity (16)"
        );
    }

    #[tokio::test]
    async fn transport_failure_writes_status_zero() {
        let fetcher = MockFetcher::new()
            .with_result(FetchResult::transport_failure("failed to execute request: refused"));
        let mut memory = memory_with(b"GET", b"");

        let rc = bridge(&fetcher).dispatch(&mut memory, params(3, 0, 0, 64)).await;

        assert_eq!(rc, HOST_OK);
        assert_eq!(cell(&memory, STATUS_AT), 0);
        assert_eq!(cell(&memory, BODY_LEN_AT), 0);
        let err_len = cell(&memory, ERR_LEN_AT);
        assert_eq!(
            bytes(&memory, ERR_AT, err_len),
            b"failed to execute request: refused"
        );
    }

    #[tokio::test]
    async fn body_read_failure_keeps_status() {
        let fetcher = MockFetcher::new()
            .with_result(FetchResult::body_read_failure(502, "failed to read response body"));
        let mut memory = memory_with(b"GET", b"");

        let rc = bridge(&fetcher).dispatch(&mut memory, params(3, 0, 0, 64)).await;

        assert_eq!(rc, HOST_OK);
        assert_eq!(cell(&memory, STATUS_AT), 502);
        assert_eq!(cell(&memory, BODY_LEN_AT), 0);
        assert!(cell(&memory, ERR_LEN_AT) > 0);
    }

    #[tokio::test]
    async fn unreadable_request_faults_without_writing() {
        let fetcher = MockFetcher::new();
        let mut memory = memory_with(b"GET", b"");
        let mut p = params(3, 0, 0, 64);
        p.1 = 4096;

        let rc = bridge(&fetcher).dispatch(&mut memory, p).await;

        assert_eq!(rc, HOST_FAULT);
        assert!(fetcher.requests().is_empty());
        assert_eq!(cell(&memory, STATUS_AT), 0);
        assert_eq!(cell(&memory, BODY_LEN_AT), 0);
        assert_eq!(cell(&memory, ERR_LEN_AT), 0);
    }

    #[tokio::test]
    async fn unwritable_output_faults() {
        let fetcher = MockFetcher::new().with_result(FetchResult::success(200, b"x".to_vec()));
        let mut memory = memory_with(b"GET", b"");
        let mut p = params(3, 0, 0, 64);
        p.13 = 1022;

        let rc = bridge(&fetcher).dispatch(&mut memory, p).await;

        assert_eq!(rc, HOST_FAULT);
        assert_eq!(cell(&memory, STATUS_AT), 0);
    }

    #[tokio::test]
    async fn denied_request_reports_permission_error() {
        let fetcher = MockFetcher::new();
        let mut memory = memory_with(b"GET", b"");
        let bridge = HostFunctionBridge::new("mcp", Arc::new(DenyAllGate), Arc::new(fetcher.clone()));

        let rc = bridge.dispatch(&mut memory, params(3, 0, 0, 64)).await;

        assert_eq!(rc, HOST_OK);
        assert!(fetcher.requests().is_empty());
        assert_eq!(cell(&memory, STATUS_AT), 0);
        assert_eq!(cell(&memory, BODY_LEN_AT), 0);
        let err_len = cell(&memory, ERR_LEN_AT);
        assert!(bytes(&memory, ERR_AT, err_len).starts_with(b"permission denied: "));
    }

    #[tokio::test]
    async fn allow_list_gate_permits_listed_host() {
        let fetcher = MockFetcher::new();
        let mut memory = memory_with(b"GET", b"");
        let gate = HostAllowListGate::new(["example.org"]);
        let bridge = HostFunctionBridge::new("mcp", Arc::new(gate), Arc::new(fetcher.clone()));

        assert_eq!(bridge.dispatch(&mut memory, params(3, 0, 0, 64)).await, HOST_OK);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn long_error_is_truncated_with_true_length() {
        let message = "e".repeat(300);
        let fetcher = MockFetcher::new().with_result(FetchResult::transport_failure(message));
        let mut memory = memory_with(b"GET", b"");

        bridge(&fetcher).dispatch(&mut memory, params(3, 0, 0, 64)).await;

        assert_eq!(cell(&memory, ERR_LEN_AT), 300);
        assert_eq!(memory[usize::try_from(ERR_AT + ERR_CAP).unwrap()], 0);
    }
}
