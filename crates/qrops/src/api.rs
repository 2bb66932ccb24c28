//! The vendor API surface the toolkit consumes
//!
//! [`QrApi`] is the seam between the orchestration code and HTTP: the
//! migration pipeline and the batch deleter are written against the trait,
//! so their sequencing and safety rules can be exercised with an in-memory
//! fake. [`HttpQrApi`] is the production implementation over the
//! rate-limited client.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use qrops_core::codes::{AccessToken, Account, Folder, QrCode};
use qrops_core::design::CodeDesign;
use qrops_core::domain::DomainId;

use crate::client::{
    fetch_all, PageFetcher, RateLimitedClient, API_BASE, DESIGN_API_BASE, PAGE_SIZE,
};
use crate::error::Error;

/// The list/get/create/delete/update/patch operations the toolkit needs.
#[async_trait]
pub trait QrApi {
    /// Look up a folder by exact name.
    async fn find_folder(&mut self, name: &str) -> Result<Option<Folder>, Error>;

    /// Fetch every code in the account, or in one folder, in API order.
    async fn list_codes(&mut self, folder_id: Option<u64>) -> Result<Vec<QrCode>, Error>;

    /// Create a code; the vendor assigns the id and a default short URL.
    async fn create_code(
        &mut self,
        title: &str,
        target_url: &str,
        type_id: u32,
    ) -> Result<QrCode, Error>;

    /// Delete a code. Both 200 and 204 signal success.
    async fn delete_code(&mut self, id: u64) -> Result<(), Error>;

    /// Re-assert a code's vanity short URL.
    async fn update_short_url(
        &mut self,
        id: u64,
        short_code: &str,
        domain_id: DomainId,
    ) -> Result<(), Error>;

    /// Fetch a code's design metadata from the secondary endpoint.
    async fn get_design(&mut self, id: u64) -> Result<CodeDesign, Error>;

    /// Patch a code's design on the secondary endpoint.
    async fn apply_design(&mut self, id: u64, payload: &Value) -> Result<(), Error>;
}

/// [`QrApi`] over HTTP, bound to one account.
pub struct HttpQrApi {
    client: RateLimitedClient,
}

impl HttpQrApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }

    /// List the account's access tokens.
    ///
    /// The endpoint has returned both a bare array and an `{"items": [...]}`
    /// wrapper; accept either.
    pub async fn list_access_tokens(&mut self) -> Result<Vec<AccessToken>, Error> {
        let url = format!("{API_BASE}/access-tokens");
        let response = self.client.get(&url).await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Failed to parse access-tokens response: {e}")))?;

        let items = match body.get("items") {
            Some(items) => items.clone(),
            None => body,
        };

        serde_json::from_value(items)
            .map_err(|e| Error::Generic(format!("Failed to parse access tokens: {e}")))
    }

    /// Download a code's rendered image as PNG bytes.
    pub async fn download_png(&mut self, id: u64) -> Result<Vec<u8>, Error> {
        let url = format!("{API_BASE}/codes/{id}/download");
        let response = self
            .client
            .get_with_query(&url, &[("format", "PNG".to_string())])
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

struct CodesPages<'a> {
    client: &'a mut RateLimitedClient,
    folder_id: Option<u64>,
}

#[async_trait]
impl PageFetcher for CodesPages<'_> {
    async fn fetch_page(&mut self, page: usize) -> Result<Vec<QrCode>, Error> {
        let url = format!("{API_BASE}/codes");
        let mut query = vec![
            ("per-page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(folder_id) = self.folder_id {
            query.push(("folder_id", folder_id.to_string()));
        }

        let response = self.client.get_with_query(&url, &query).await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Failed to parse codes page {page}: {e}")))
    }
}

#[async_trait]
impl QrApi for HttpQrApi {
    async fn find_folder(&mut self, name: &str) -> Result<Option<Folder>, Error> {
        let url = format!("{API_BASE}/account");
        let response = self
            .client
            .get_with_query(&url, &[("expand", "folders,statistics".to_string())])
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let account: Account = response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Failed to parse account response: {e}")))?;

        Ok(account.find_folder(name).cloned())
    }

    async fn list_codes(&mut self, folder_id: Option<u64>) -> Result<Vec<QrCode>, Error> {
        let mut pages = CodesPages {
            client: &mut self.client,
            folder_id,
        };
        fetch_all(&mut pages).await
    }

    async fn create_code(
        &mut self,
        title: &str,
        target_url: &str,
        type_id: u32,
    ) -> Result<QrCode, Error> {
        let url = format!("{API_BASE}/codes");
        let payload = json!({
            "typeId": type_id,
            "title": title,
            "data": {"url": target_url},
        });

        let response = self.client.post(&url, &payload).await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Failed to parse create response: {e}")))
    }

    async fn delete_code(&mut self, id: u64) -> Result<(), Error> {
        let url = format!("{API_BASE}/codes/{id}");
        let response = self.client.delete(&url).await?;

        // The endpoint answers 204 (no content) or, historically, 200.
        match response.status().as_u16() {
            200 | 204 => Ok(()),
            _ => Err(Error::from_response(response).await),
        }
    }

    async fn update_short_url(
        &mut self,
        id: u64,
        short_code: &str,
        domain_id: DomainId,
    ) -> Result<(), Error> {
        let url = format!("{API_BASE}/codes/{id}");
        let payload = json!({
            "short_code": short_code,
            "domain_id": domain_id,
        });

        let response = self.client.put(&url, &payload).await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        Ok(())
    }

    async fn get_design(&mut self, id: u64) -> Result<CodeDesign, Error> {
        let url = format!("{DESIGN_API_BASE}/{id}");
        let response = self.client.execute_design(Method::GET, &url, None).await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Failed to parse design for code {id}: {e}")))
    }

    async fn apply_design(&mut self, id: u64, payload: &Value) -> Result<(), Error> {
        let url = format!("{DESIGN_API_BASE}/{id}");
        let response = self
            .client
            .execute_design(Method::PATCH, &url, Some(payload))
            .await?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            _ => Err(Error::from_response(response).await),
        }
    }
}
