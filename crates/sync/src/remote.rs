use std::time::Duration;

use async_trait::async_trait;
use floorsync_core::{
    ids::*,
    model::{DocumentType, NewLine, Priority},
};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Descriptor returned by `GET /doctypes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocumentType {
    #[serde(rename = "type")]
    pub code: String,
    #[serde(default)]
    pub title: String,
}

impl RemoteDocumentType {
    /// `None` for types this device does not handle.
    pub fn document_type(&self) -> Option<DocumentType> {
        DocumentType::parse(&self.code).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocumentSummary {
    pub id: DocumentId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLine {
    pub id: LineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub barcode: String,
    pub declared_quantity: u32,
    #[serde(default)]
    pub current_quantity: u32,
    #[serde(default)]
    pub cell_id: Option<CellId>,
}

impl From<RemoteLine> for NewLine {
    fn from(line: RemoteLine) -> Self {
        NewLine {
            id: line.id,
            product_id: line.product_id,
            product_name: line.product_name,
            barcode: line.barcode,
            quantity_plan: line.declared_quantity,
            quantity_fact: line.current_quantity,
            cell_id: line.cell_id,
        }
    }
}

/// Full document from `GET /docs/{type}/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: DocumentId,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, alias = "items")]
    pub lines: Vec<RemoteLine>,
}

impl RemoteDocument {
    /// Unknown priority labels are treated as absent.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
            .as_deref()
            .and_then(|p| Priority::parse(&p.trim().to_lowercase()).ok())
    }
}

/// Body of `PATCH /items/{lineId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub current_quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cell_id: Option<CellId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason_code: Option<String>,
}

/// The remote Document API, consumed but not implemented here.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn document_types(&self) -> Result<Vec<RemoteDocumentType>, RemoteError>;

    async fn list_documents(
        &self,
        doc_type: DocumentType,
    ) -> Result<Vec<RemoteDocumentSummary>, RemoteError>;

    async fn get_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<RemoteDocument, RemoteError>;

    async fn update_item_quantity(
        &self,
        line_id: &LineId,
        update: &ItemUpdate,
    ) -> Result<(), RemoteError>;

    async fn finish_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone)]
pub struct HttpDocumentApi {
    client: Client,
    base_url: String,
}

impl HttpDocumentApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Non-2xx responses become `Rejected` with whatever body the server sent.
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn document_types(&self) -> Result<Vec<RemoteDocumentType>, RemoteError> {
        let response = self
            .client
            .get(self.url("/doctypes"))
            .header("accept", "application/json")
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_documents(
        &self,
        doc_type: DocumentType,
    ) -> Result<Vec<RemoteDocumentSummary>, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/docs/{}", doc_type.as_str())))
            .header("accept", "application/json")
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<RemoteDocument, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/docs/{}/{}", doc_type.as_str(), id)))
            .header("accept", "application/json")
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update_item_quantity(
        &self,
        line_id: &LineId,
        update: &ItemUpdate,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(self.url(&format!("/items/{line_id}")))
            .json(update)
            .send()
            .await?;
        check(response).await?;
        tracing::debug!(line = %line_id, quantity = update.current_quantity, "item update acknowledged");
        Ok(())
    }

    async fn finish_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("/docs/{}/{}/finish", doc_type.as_str(), id)))
            .send()
            .await?;
        check(response).await?;
        tracing::debug!(doc = %id, %doc_type, "document finish acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_decodes_from_api_shape() {
        let json = r#"{
            "id": "RC-100",
            "priority": "URGENT",
            "items": [
                {"id": "L1", "productId": "P-1", "productName": "Shrink film",
                 "barcode": "4600000000001", "declaredQuantity": 10, "currentQuantity": 4}
            ]
        }"#;
        let doc: RemoteDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.priority(), Some(Priority::Urgent));
        let line: NewLine = doc.lines[0].clone().into();
        assert_eq!(line.quantity_plan, 10);
        assert_eq!(line.quantity_fact, 4);
        assert_eq!(line.cell_id, None);
    }

    #[test]
    fn item_update_omits_absent_fields() {
        let body = serde_json::to_value(ItemUpdate {
            current_quantity: 7,
            cell_id: None,
            reason_code: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "currentQuantity": 7 }));
    }

    #[test]
    fn unknown_doctype_is_ignored() {
        let types: Vec<RemoteDocumentType> =
            serde_json::from_str(r#"[{"type":"receiving","title":"Receiving"},{"type":"audit"}]"#)
                .unwrap();
        let handled: Vec<_> = types.iter().filter_map(|t| t.document_type()).collect();
        assert_eq!(handled, vec![DocumentType::Receiving]);
    }

    #[test]
    fn base_url_is_normalized() {
        let api = HttpDocumentApi::new("http://localhost:8080/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8080/api");
        assert_eq!(api.url("/doctypes"), "http://localhost:8080/api/doctypes");
    }
}
