use std::time::Duration;

use async_trait::async_trait;
use ledgerlink_core::StorageId;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::store::{Fields, RecordStore, StoredRow};

pub const DEFAULT_API_URL: &str = "https://api.airtable.com";

/// The store never returns more than 100 rows per page.
const PAGE_SIZE: u32 = 100;

/// REST client for one base of the tabular store. Authenticates with a bearer
/// API key and pages listings with the opaque `offset` cursor.
pub struct TableClient {
    http: Client,
    api_url: Url,
    base_id: String,
    api_key: String,
}

#[derive(Deserialize)]
struct WireRow {
    id: StorageId,
    #[serde(default)]
    fields: Fields,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<WireRow>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    fields: &'a Fields,
    typecast: bool,
}

#[derive(Deserialize)]
struct Written {
    id: StorageId,
}

impl TableClient {
    pub fn new(
        api_url: &str,
        base_id: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let api_url =
            Url::parse(api_url).map_err(|e| MirrorError::InvalidUrl(format!("{api_url}: {e}")))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url,
            base_id: base_id.into(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str, id: Option<&StorageId>) -> Result<Url, MirrorError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| MirrorError::InvalidUrl(self.api_url.to_string()))?;
            segments.pop_if_empty().push("v0").push(&self.base_id).push(table);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, MirrorError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(MirrorError::from_response(status.as_u16(), &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| MirrorError::Decode(e.to_string()))
    }

    async fn write(
        &self,
        method: Method,
        url: Url,
        fields: &Fields,
    ) -> Result<StorageId, MirrorError> {
        tracing::debug!("{method} {url}");
        let body = WriteBody {
            fields,
            typecast: true,
        };
        let written: Written = self.send(self.http.request(method, url).json(&body)).await?;
        Ok(written.id)
    }
}

#[async_trait]
impl RecordStore for TableClient {
    async fn list(&self, table: &str) -> Result<Vec<StoredRow>, MirrorError> {
        let url = self.table_url(table, None)?;
        let mut rows = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(url.clone())
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor)]);
            }
            let page: ListResponse = self.send(request).await?;
            rows.extend(page.records.into_iter().map(|r| StoredRow {
                id: r.id,
                fields: r.fields,
            }));
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        tracing::debug!(table, rows = rows.len(), "Listed mirror table");
        Ok(rows)
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<StorageId, MirrorError> {
        let url = self.table_url(table, None)?;
        self.write(Method::POST, url, &fields).await
    }

    async fn update(&self, table: &str, id: &StorageId, fields: Fields) -> Result<(), MirrorError> {
        let url = self.table_url(table, Some(id))?;
        self.write(Method::PATCH, url, &fields).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &StorageId) -> Result<(), MirrorError> {
        let url = self.table_url(table, Some(id))?;
        tracing::debug!("DELETE {url}");
        let _: Written = self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
