//! Elgato Key Light HTTP driver.
//!
//! The lights expose a tiny JSON API: `GET /elgato/lights` returns the light
//! group, `PUT /elgato/lights` with the same document writes it back.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::{
    error::DeviceError,
    light::{LightDevice, LightGroup},
};

pub const DEFAULT_PORT: u16 = 9123;

const LIGHTS_PATH: &str = "/elgato/lights";

/// Builds the HTTP client shared by every light.
pub fn http_client(request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(request_timeout)
        .user_agent(concat!("keylightd/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[derive(Debug, Clone)]
pub struct ElgatoLight {
    name: String,
    host: String,
    port: u16,
    http: Client,
}

impl ElgatoLight {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, http: Client) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            http,
        }
    }

    fn lights_url(&self) -> String {
        format!("http://{}{LIGHTS_PATH}", self.address())
    }

    fn fetch_error(&self, reason: impl ToString) -> DeviceError {
        DeviceError::Fetch {
            device: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, reason: impl ToString) -> DeviceError {
        DeviceError::Write {
            device: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl LightDevice for ElgatoLight {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    async fn fetch_light_group(&self) -> Result<LightGroup, DeviceError> {
        let url = self.lights_url();
        debug!("GET {url}");

        self.http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| self.fetch_error(e))?
            .json::<LightGroup>()
            .await
            .map_err(|e| self.fetch_error(e))
    }

    async fn update_light_group(&self, group: &LightGroup) -> Result<(), DeviceError> {
        let url = self.lights_url();
        debug!("PUT {url}");

        self.http
            .put(&url)
            .json(group)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|e| self.write_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::Light;
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    const GROUP_JSON: &str =
        r#"{"numberOfLights":1,"lights":[{"on":0,"brightness":40,"temperature":213}]}"#;

    fn light_at(host: &str, port: u16) -> ElgatoLight {
        let http = http_client(Duration::from_secs(2)).unwrap();
        ElgatoLight::new(r"Elgato\ Key\ Light", host, port, http)
    }

    /// Reads one HTTP request (headers plus `Content-Length` body).
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8(raw).unwrap()
    }

    /// Serves a single request with `status` and `body`, returning the request.
    async fn serve_once(status: &'static str, body: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            request
        });

        (port, handle)
    }

    #[test]
    fn address_brackets_ipv6_hosts() {
        assert_eq!(light_at("192.0.2.7", 9123).address(), "192.0.2.7:9123");
        assert_eq!(light_at("fe80::1", 9123).address(), "[fe80::1]:9123");
        assert_eq!(light_at("[fe80::1]", 9123).address(), "[fe80::1]:9123");
        assert_eq!(
            light_at("keylight.local", 9123).lights_url(),
            "http://keylight.local:9123/elgato/lights"
        );
    }

    #[tokio::test]
    async fn fetch_parses_the_light_group() {
        let (port, server) = serve_once("200 OK", GROUP_JSON).await;

        let group = light_at("127.0.0.1", port).fetch_light_group().await.unwrap();
        assert_eq!(
            group,
            LightGroup::from(vec![Light {
                on: 0,
                brightness: 40,
                temperature: 213,
            }])
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /elgato/lights HTTP/1.1"));
    }

    #[tokio::test]
    async fn update_puts_the_json_document() {
        let (port, server) = serve_once("200 OK", GROUP_JSON).await;
        let group = LightGroup::from(vec![Light {
            on: 1,
            brightness: 55,
            temperature: 250,
        }]);

        light_at("127.0.0.1", port)
            .update_light_group(&group)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /elgato/lights HTTP/1.1"));
        assert!(request.ends_with(
            r#"{"numberOfLights":1,"lights":[{"on":1,"brightness":55,"temperature":250}]}"#
        ));
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let (port, _server) = serve_once("500 Internal Server Error", "{}").await;

        let result = light_at("127.0.0.1", port).fetch_light_group().await;
        assert!(matches!(result, Err(DeviceError::Fetch { .. })));
    }

    #[tokio::test]
    async fn malformed_body_is_a_fetch_error() {
        let (port, _server) = serve_once("200 OK", r#"{"lights":"nope"}"#).await;

        let result = light_at("127.0.0.1", port).fetch_light_group().await;
        assert!(matches!(result, Err(DeviceError::Fetch { .. })));
    }

    #[tokio::test]
    async fn unreachable_device_is_a_write_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = light_at("127.0.0.1", port)
            .update_light_group(&LightGroup::from(vec![]))
            .await;
        match result {
            Err(DeviceError::Write { device, .. }) => assert_eq!(device, r"Elgato\ Key\ Light"),
            other => panic!("expected write error, got {other:?}"),
        }
    }
}
