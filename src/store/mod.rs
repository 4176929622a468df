//! Document persistence behind a trait so handlers never see the backend.

use async_trait::async_trait;

use crate::auth::repo_types::AuthCode;
use crate::images::repo_types::Image;
use crate::invoices::repo_types::{Invoice, InvoiceFilter, InvoiceStatus, NewInvoice};
use crate::projects::repo_types::{NewProject, Project};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts and assigns the next id from the store's atomic counter.
    async fn insert_invoice(&self, new: NewInvoice) -> anyhow::Result<Invoice>;
    async fn get_invoice(&self, id: i64) -> anyhow::Result<Option<Invoice>>;
    /// Up to `limit` invoices with `id < before` (all if `None`), newest first.
    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        before: Option<i64>,
        limit: i64,
    ) -> anyhow::Result<Vec<Invoice>>;
    /// Compare-and-set on status. Returns false when the current status
    /// was not `from` (or the invoice does not exist).
    async fn update_invoice_status(
        &self,
        id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> anyhow::Result<bool>;
    async fn attach_processor_ids(
        &self,
        id: i64,
        processor_invoice_id: &str,
        processor_customer_id: &str,
    ) -> anyhow::Result<()>;
    /// Rewrites an open proposal as an invoice. Returns None if no open
    /// proposal with that id exists.
    async fn promote_proposal(&self, id: i64) -> anyhow::Result<Option<Invoice>>;
    async fn delete_invoice(&self, id: i64) -> anyhow::Result<()>;

    async fn insert_project(&self, new: NewProject) -> anyhow::Result<Project>;
    async fn get_project(&self, id: i64) -> anyhow::Result<Option<Project>>;
    async fn list_projects(&self) -> anyhow::Result<Vec<Project>>;
    async fn update_project(&self, project: &Project) -> anyhow::Result<()>;
    async fn delete_project(&self, id: i64) -> anyhow::Result<bool>;

    async fn insert_image(&self, s3_key: &str, file_name: &str) -> anyhow::Result<Image>;
    async fn get_image(&self, id: i64) -> anyhow::Result<Option<Image>>;
    async fn list_images(&self) -> anyhow::Result<Vec<Image>>;
    async fn delete_image(&self, id: i64) -> anyhow::Result<bool>;

    /// Insert or overwrite the code for `code.email`.
    async fn put_auth_code(&self, code: &AuthCode) -> anyhow::Result<()>;
    async fn get_auth_code(&self, email: &str) -> anyhow::Result<Option<AuthCode>>;
    async fn delete_auth_code(&self, email: &str) -> anyhow::Result<()>;
    /// Counts a wrong guess against the current code and returns the new
    /// total; 0 when there is no code. Reset by `put_auth_code`.
    async fn record_failed_attempt(&self, email: &str) -> anyhow::Result<u32>;
}
