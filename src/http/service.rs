use crate::http::request::ApiRequest;
use crate::http::router::handle;
use crate::http::state::AppState;
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// `may_minihttp` adapter; one clone per connection coroutine
#[derive(Clone)]
pub struct ApiService {
    state: Arc<AppState>,
}

impl ApiService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl HttpService for ApiService {
    fn call(&mut self, req: Request, rsp: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let target = req.path().to_string();
        let mut body = Vec::new();
        req.body().read_to_end(&mut body)?;

        let request = ApiRequest::new(&method, &target, body);
        let response = handle(&self.state, &request);

        match response.status {
            500..=599 => log::error!("{method} {} -> {}", request.path, response.status),
            400..=499 => log::warn!("{method} {} -> {}", request.path, response.status),
            _ => log::debug!("{method} {} -> {}", request.path, response.status),
        }
        #[cfg(feature = "metrics")]
        METRICS.record_http(response.status);

        rsp.status_code(usize::from(response.status), response.reason());
        rsp.header(response.content_type);
        rsp.body_vec(response.body);
        Ok(())
    }
}
