//! SOCKS proxy transport for the S3 client.
//!
//! The SDK's default HTTP client has no SOCKS support, so when a proxy is
//! configured its connector is replaced by a `reqwest` client. Response bodies
//! are buffered in memory on this path.

use aws_smithy_runtime_api::client::http::{
    HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpConnector,
};
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::ConnectorError;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;

use crate::config::ProxyEndpoint;

#[derive(Debug, Clone)]
pub struct SocksHttpClient {
    client: reqwest::Client,
}

impl SocksHttpClient {
    pub fn new(endpoint: &ProxyEndpoint) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(endpoint.url())?)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for SocksHttpClient {
    fn http_connector(
        &self,
        _settings: &HttpConnectorSettings,
        _components: &RuntimeComponents,
    ) -> SharedHttpConnector {
        SharedHttpConnector::new(SocksConnector {
            client: self.client.clone(),
        })
    }
}

#[derive(Debug)]
struct SocksConnector {
    client: reqwest::Client,
}

impl HttpConnector for SocksConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let client = self.client.clone();
        HttpConnectorFuture::new(async move { send(client, request).await })
    }
}

async fn send(client: reqwest::Client, request: HttpRequest) -> Result<HttpResponse, ConnectorError> {
    let method = reqwest::Method::from_bytes(request.method().as_bytes())
        .map_err(|e| ConnectorError::other(Box::new(e), None))?;
    // SDK request bodies for the calls made here are always in memory.
    let body = request
        .body()
        .bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ConnectorError::other("streaming request bodies are not supported".into(), None))?;

    let mut builder = client.request(method, request.uri());
    for (name, value) in request.headers().iter() {
        builder = builder.header(name, value);
    }

    let response = builder.body(body).send().await.map_err(|e| {
        if e.is_timeout() {
            ConnectorError::timeout(Box::new(e))
        } else {
            ConnectorError::io(Box::new(e))
        }
    })?;

    let status = StatusCode::try_from(response.status().as_u16())
        .map_err(|e| ConnectorError::other(Box::new(e), None))?;
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ConnectorError::io(Box::new(e)))?;

    let mut sdk_response = HttpResponse::new(status, SdkBody::from(bytes));
    for (name, value) in headers {
        sdk_response.headers_mut().append(name, value);
    }
    Ok(sdk_response)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn builds_client_for_socks_endpoint() {
        let endpoint = ProxyEndpoint {
            host: "127.0.0.1".into(),
            port: 8001,
        };
        assert!(SocksHttpClient::new(&endpoint).is_ok());
    }

    /// Accepts one connection, captures the raw request and answers with a
    /// fixed 403 response.
    async fn serve_once(listener: TcpListener) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the request was complete");
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        let body = "<Error><Code>AccessDenied</Code></Error>";
        let response = format!(
            "HTTP/1.1 403 Forbidden\r\nx-amz-request-id: req-123\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[tokio::test]
    async fn connector_translates_request_and_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener));

        let mut request = HttpRequest::new(SdkBody::from("payload"));
        request.set_method("PUT").unwrap();
        request
            .set_uri(format!("http://{addr}/bucket/some/key"))
            .unwrap();
        request.headers_mut().insert("x-test", "1");

        let connector = SocksConnector {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        };
        let response = connector.call(request).await.unwrap();

        assert_eq!(response.status().as_u16(), 403);
        assert_eq!(response.headers().get("x-amz-request-id"), Some("req-123"));
        assert_eq!(
            response.body().bytes(),
            Some(&b"<Error><Code>AccessDenied</Code></Error>"[..])
        );

        let seen = server.await.unwrap();
        assert!(seen.starts_with("PUT /bucket/some/key HTTP/1.1\r\n"));
        assert!(seen.to_ascii_lowercase().contains("\r\nx-test: 1\r\n"));
        assert!(seen.ends_with("\r\n\r\npayload"));
    }

    #[tokio::test]
    async fn connector_reports_unreachable_host_as_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut request = HttpRequest::new(SdkBody::empty());
        request.set_uri(format!("http://{addr}/")).unwrap();

        let connector = SocksConnector {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        };
        let err = connector.call(request).await.unwrap_err();
        assert!(err.is_io());
    }
}
