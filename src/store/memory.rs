use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::Store;
use crate::auth::repo_types::AuthCode;
use crate::images::repo_types::Image;
use crate::invoices::repo_types::{Invoice, InvoiceFilter, InvoiceStatus, NewInvoice};
use crate::projects::repo_types::{NewProject, Project};

#[derive(Default)]
struct Tables {
    invoice_seq: i64,
    invoices: BTreeMap<i64, Invoice>,
    project_seq: i64,
    projects: BTreeMap<i64, Project>,
    image_seq: i64,
    images: BTreeMap<i64, Image>,
    auth_codes: HashMap<String, AuthCode>,
    failed_attempts: HashMap<String, u32>,
}

/// Process-local store for running without Postgres and for tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_invoice(&self, new: NewInvoice) -> anyhow::Result<Invoice> {
        let mut t = self.tables.lock().await;
        t.invoice_seq += 1;
        let invoice = Invoice {
            id: t.invoice_seq,
            invoice_amount: new.invoice_amount(),
            customer_email: new.customer_email,
            customer_name: new.customer_name,
            description: new.description,
            lines: new.lines,
            status: new.status,
            is_proposal: new.is_proposal,
            secret_code: new.secret_code,
            processor_invoice_id: None,
            processor_customer_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, id: i64) -> anyhow::Result<Option<Invoice>> {
        Ok(self.tables.lock().await.invoices.get(&id).cloned())
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        before: Option<i64>,
        limit: i64,
    ) -> anyhow::Result<Vec<Invoice>> {
        let t = self.tables.lock().await;
        let upper = before.unwrap_or(i64::MAX);
        Ok(t.invoices
            .range(..upper)
            .rev()
            .map(|(_, inv)| inv)
            .filter(|inv| filter.matches(inv))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_invoice_status(
        &self,
        id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        match t.invoices.get_mut(&id) {
            Some(inv) if inv.status == from => {
                inv.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_processor_ids(
        &self,
        id: i64,
        processor_invoice_id: &str,
        processor_customer_id: &str,
    ) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        let inv = t
            .invoices
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("invoice {id} not found"))?;
        inv.processor_invoice_id = Some(processor_invoice_id.to_string());
        inv.processor_customer_id = Some(processor_customer_id.to_string());
        Ok(())
    }

    async fn promote_proposal(&self, id: i64) -> anyhow::Result<Option<Invoice>> {
        let mut t = self.tables.lock().await;
        match t.invoices.get_mut(&id) {
            Some(inv) if inv.is_proposal && inv.status == InvoiceStatus::Open => {
                inv.is_proposal = false;
                Ok(Some(inv.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_invoice(&self, id: i64) -> anyhow::Result<()> {
        self.tables.lock().await.invoices.remove(&id);
        Ok(())
    }

    async fn insert_project(&self, new: NewProject) -> anyhow::Result<Project> {
        let mut t = self.tables.lock().await;
        t.project_seq += 1;
        let project = Project {
            id: t.project_seq,
            title: new.title,
            description: new.description,
            main_image: new.main_image,
            additional_images: new.additional_images,
            created_at: OffsetDateTime::now_utc(),
        };
        t.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: i64) -> anyhow::Result<Option<Project>> {
        Ok(self.tables.lock().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        Ok(self.tables.lock().await.projects.values().rev().cloned().collect())
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        let slot = t
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| anyhow::anyhow!("project {} not found", project.id))?;
        *slot = project.clone();
        Ok(())
    }

    async fn delete_project(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.tables.lock().await.projects.remove(&id).is_some())
    }

    async fn insert_image(&self, s3_key: &str, file_name: &str) -> anyhow::Result<Image> {
        let mut t = self.tables.lock().await;
        t.image_seq += 1;
        let image = Image {
            id: t.image_seq,
            s3_key: s3_key.to_string(),
            file_name: file_name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn get_image(&self, id: i64) -> anyhow::Result<Option<Image>> {
        Ok(self.tables.lock().await.images.get(&id).cloned())
    }

    async fn list_images(&self) -> anyhow::Result<Vec<Image>> {
        Ok(self.tables.lock().await.images.values().rev().cloned().collect())
    }

    async fn delete_image(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.tables.lock().await.images.remove(&id).is_some())
    }

    async fn put_auth_code(&self, code: &AuthCode) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        t.failed_attempts.remove(&code.email);
        t.auth_codes.insert(code.email.clone(), code.clone());
        Ok(())
    }

    async fn get_auth_code(&self, email: &str) -> anyhow::Result<Option<AuthCode>> {
        Ok(self.tables.lock().await.auth_codes.get(email).cloned())
    }

    async fn delete_auth_code(&self, email: &str) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        t.auth_codes.remove(email);
        t.failed_attempts.remove(email);
        Ok(())
    }

    async fn record_failed_attempt(&self, email: &str) -> anyhow::Result<u32> {
        let mut t = self.tables.lock().await;
        if !t.auth_codes.contains_key(email) {
            return Ok(0);
        }
        let count = t.failed_attempts.entry(email.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
