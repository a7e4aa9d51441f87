use super::controller::{MutationController, MutationPlan};
use crate::api::{ImportKind, StatementFile, validate_batch};
use crate::cache::{CacheKey, KeyFilter};
use crate::core::{ApiError, EntityId, Result, Statement};
use tracing::{Level, event};

/// Per-file outcome of a batch import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub file_name: String,
    pub result: Result<Statement>,
}

impl MutationController {
    /// An import creates transactions and moves balances.
    fn import_plan(&self, operation: &'static str) -> MutationPlan {
        MutationPlan::new(operation)
            .invalidate(KeyFilter::Prefix(CacheKey::resource("statement")))
            .invalidate(KeyFilter::Prefix(CacheKey::transaction_lists()))
            .invalidate(KeyFilter::Prefix(CacheKey::resource("account")))
    }

    pub async fn upload_statement(
        &self,
        account_id: EntityId,
        file: StatementFile,
        kind: ImportKind,
    ) -> Result<Statement> {
        const OPERATION: &str = "upload_statement";
        if let Err(err) = file.validate(kind, &self.api.upload_limits()) {
            return self.reject(OPERATION, err);
        }
        let api = self.api.clone();
        self.run(
            self.import_plan(OPERATION),
            async move { api.upload_statement(account_id, &file, kind).await },
            |_| None,
        )
        .await
    }

    /// Upload files one after another. The whole batch is rejected up front
    /// when it breaks a limit; afterwards each file succeeds or fails on its
    /// own.
    pub async fn upload_statements(
        &self,
        account_id: EntityId,
        files: Vec<StatementFile>,
        kind: ImportKind,
    ) -> Result<Vec<ImportOutcome>> {
        const OPERATION: &str = "upload_statements";
        if let Err(err) = validate_batch(&files, kind, &self.api.upload_limits()) {
            return self.reject(OPERATION, err);
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let result = self.api.upload_statement(account_id, &file, kind).await;
            if let Err(err) = &result {
                self.report(OPERATION, err);
            }
            outcomes.push(ImportOutcome {
                file_name: file.file_name,
                result,
            });
        }

        let imported = outcomes.iter().filter(|o| o.result.is_ok()).count();
        event!(
            Level::INFO,
            imported,
            failed = outcomes.len() - imported,
            "statement batch finished"
        );
        if imported > 0 {
            // Nothing to speculate; the plan only settles dependent caches.
            let plan = self.import_plan(OPERATION);
            self.run(plan, async { Ok::<_, ApiError>(()) }, |_| None).await?;
        }
        Ok(outcomes)
    }
}
