use super::upload::{ImportKind, StatementFile};
use super::{ApiClient, ApiRequest, MultipartField, RequestBody, collection_path};
use crate::core::{Entity, EntityId, Page, Result, Statement};

impl ApiClient {
    pub async fn list_statements(&self, page: u32, page_size: u32) -> Result<Page<Statement>> {
        let request = ApiRequest::get(collection_path::<Statement>()).query(vec![
            ("page".to_string(), page.to_string()),
            ("page_size".to_string(), page_size.to_string()),
        ]);
        self.fetch(Statement::RESOURCE, request).await
    }

    pub async fn get_statement(&self, id: EntityId) -> Result<Statement> {
        self.get::<Statement>(id).await
    }

    /// Upload one statement file for `account_id` as multipart form data.
    /// The file is checked against the configured limits before sending.
    pub async fn upload_statement(
        &self,
        account_id: EntityId,
        file: &StatementFile,
        kind: ImportKind,
    ) -> Result<Statement> {
        file.validate(kind, &self.upload_limits())?;

        let fields = vec![
            MultipartField::Text {
                name: "account_id".to_string(),
                value: account_id.to_string(),
            },
            MultipartField::File {
                name: "file".to_string(),
                file_name: file.file_name.clone(),
                content_type: file.content_type().to_string(),
                bytes: file.bytes.clone(),
            },
        ];
        let request = ApiRequest::post(
            collection_path::<Statement>(),
            RequestBody::Multipart(fields),
        );
        self.fetch(Statement::RESOURCE, request).await
    }
}
