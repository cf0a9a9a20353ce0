//! HTTP implementation of [`RemoteClient`] for the Real-Debrid REST API.

use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use lodestar_core::{
    AddedTorrent, DirectLink, Download, ListPage, RemoteClient, RemoteError, RemoteResult,
    TorrentDetail, TorrentSummary, UserAccount,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Proxy, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.real-debrid.com/rest/1.0/";

const USER_AGENT: &str = concat!("lodestar/", env!("CARGO_PKG_VERSION"));
const MAGNET_PREFIX: &str = "magnet:?xt=urn:btih:";

const OK: &[StatusCode] = &[StatusCode::OK];
const OK_OR_EMPTY: &[StatusCode] = &[StatusCode::OK, StatusCode::NO_CONTENT];
const OK_OR_CREATED: &[StatusCode] = &[StatusCode::OK, StatusCode::CREATED];

/// Transport settings applied to every request.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Proxy all traffic goes through.
    pub proxy: Option<Url>,
    /// Bind outgoing connections to the IPv6 unspecified address.
    pub force_ipv6: bool,
}

impl HttpOptions {
    /// Direct connections with the given timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            proxy: None,
            force_ipv6: false,
        }
    }
}

/// Real-Debrid client authenticated with a bearer token.
#[derive(Clone)]
pub struct RealDebridClient {
    http: Client,
    base_url: Url,
}

impl RealDebridClient {
    /// Client against the production API.
    ///
    /// # Errors
    ///
    /// Returns an error when the token is not a valid header value, the proxy is
    /// rejected, or the HTTP client cannot be built.
    pub fn new(token: &str, options: &HttpOptions) -> ClientResult<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL, options)
    }

    /// Client against an arbitrary API root (used by tests and proxies).
    ///
    /// # Errors
    ///
    /// Returns an error when the URL does not parse, the token is not a valid header
    /// value, the proxy is rejected, or the HTTP client cannot be built.
    pub fn with_base_url(token: &str, base_url: &str, options: &HttpOptions) -> ClientResult<Self> {
        let normalised = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalised).map_err(|source| ClientError::InvalidBaseUrl {
            value: base_url.to_string(),
            source,
        })?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let mut builder = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(proxy) = &options.proxy {
            let proxy = Proxy::all(proxy.as_str()).map_err(|source| ClientError::InvalidProxy {
                value: proxy.to_string(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        if options.force_ipv6 {
            builder = builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        }
        let http = builder
            .build()
            .map_err(|source| ClientError::Build { source })?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, operation: &'static str, path: &str) -> RemoteResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| RemoteError::Decode {
                operation,
                source: Box::new(err),
            })
    }

    async fn send(
        operation: &'static str,
        request: RequestBuilder,
        accepted: &[StatusCode],
    ) -> RemoteResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::transient(operation, err))?;
        let status = response.status();
        if accepted.contains(&status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, status = status.as_u16(), body = %body, "remote rejected request");
        Err(RemoteError::from_status(operation, status.as_u16(), body))
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> RemoteResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RemoteError::transient(operation, err))?;
        serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode {
            operation,
            source: Box::new(err),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<T> {
        let url = self.endpoint(operation, path)?;
        let response = Self::send(operation, self.http.get(url).query(query), OK).await?;
        Self::decode(operation, response).await
    }

    /// Listing endpoints answer 204 when the requested page is past the end.
    async fn get_page<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        page: ListPage,
    ) -> RemoteResult<Vec<T>> {
        let url = self.endpoint(operation, path)?;
        let query = [
            ("offset", page.offset.to_string()),
            ("limit", page.limit.to_string()),
        ];
        let response =
            Self::send(operation, self.http.get(url).query(&query), OK_OR_EMPTY).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        Self::decode(operation, response).await
    }
}

#[async_trait]
impl RemoteClient for RealDebridClient {
    #[instrument(name = "remote.list_torrents", skip(self))]
    async fn list_torrents(&self, page: ListPage) -> RemoteResult<Vec<TorrentSummary>> {
        self.get_page("list_torrents", "torrents", page).await
    }

    #[instrument(name = "remote.torrent_detail", skip(self))]
    async fn torrent_detail(&self, id: &str) -> RemoteResult<TorrentDetail> {
        self.get_json("torrent_detail", &format!("torrents/info/{id}"), &[])
            .await
    }

    #[instrument(name = "remote.select_files", skip(self))]
    async fn select_files(&self, id: &str, file_ids: &[u32]) -> RemoteResult<()> {
        let operation = "select_files";
        let url = self.endpoint(operation, &format!("torrents/selectFiles/{id}"))?;
        let files = file_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self::send(
            operation,
            self.http.post(url).form(&[("files", files)]),
            OK_OR_EMPTY,
        )
        .await
        .map(drop)
    }

    #[instrument(name = "remote.delete_torrent", skip(self))]
    async fn delete_torrent(&self, id: &str) -> RemoteResult<()> {
        let operation = "delete_torrent";
        let url = self.endpoint(operation, &format!("torrents/delete/{id}"))?;
        Self::send(operation, self.http.delete(url), OK_OR_EMPTY)
            .await
            .map(drop)
    }

    #[instrument(name = "remote.add_by_hash", skip(self))]
    async fn add_by_hash(&self, hash: &str) -> RemoteResult<AddedTorrent> {
        let operation = "add_by_hash";
        let url = self.endpoint(operation, "torrents/addMagnet")?;
        let magnet = format!("{MAGNET_PREFIX}{hash}");
        let response = Self::send(
            operation,
            self.http.post(url).form(&[("magnet", magnet)]),
            OK_OR_CREATED,
        )
        .await?;
        Self::decode(operation, response).await
    }

    #[instrument(name = "remote.unrestrict_link", skip(self, link))]
    async fn unrestrict_link(&self, link: &str) -> RemoteResult<DirectLink> {
        let operation = "unrestrict_link";
        let url = self.endpoint(operation, "unrestrict/link")?;
        let response = Self::send(
            operation,
            self.http.post(url).form(&[("link", link)]),
            OK,
        )
        .await?;
        Self::decode(operation, response).await
    }

    #[instrument(name = "remote.list_downloads", skip(self))]
    async fn list_downloads(&self, page: ListPage) -> RemoteResult<Vec<Download>> {
        self.get_page("list_downloads", "downloads", page).await
    }

    #[instrument(name = "remote.delete_download", skip(self))]
    async fn delete_download(&self, id: &str) -> RemoteResult<()> {
        let operation = "delete_download";
        let url = self.endpoint(operation, &format!("downloads/delete/{id}"))?;
        Self::send(operation, self.http.delete(url), OK_OR_EMPTY)
            .await
            .map(drop)
    }

    #[instrument(name = "remote.user", skip(self))]
    async fn user(&self) -> RemoteResult<UserAccount> {
        self.get_json("user", "user", &[]).await
    }
}
