use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;

use super::Store;
use crate::auth::repo_types::AuthCode;
use crate::images::repo_types::Image;
use crate::invoices::repo_types::{Invoice, InvoiceFilter, InvoiceStatus, LineItem, NewInvoice};
use crate::projects::repo_types::{ImageRef, NewProject, Project};

const INVOICE_COLUMNS: &str = r#"
    id, customer_email, customer_name, description, lines, invoice_amount, status,
    is_proposal, secret_code, processor_invoice_id, processor_customer_id, created_at
"#;

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: i64,
    customer_email: String,
    customer_name: Option<String>,
    description: Option<String>,
    lines: Json<Vec<LineItem>>,
    invoice_amount: Decimal,
    status: String,
    is_proposal: bool,
    secret_code: String,
    processor_invoice_id: Option<String>,
    processor_customer_id: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = anyhow::Error;

    fn try_from(r: InvoiceRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: r.id,
            customer_email: r.customer_email,
            customer_name: r.customer_name,
            description: r.description,
            lines: r.lines.0,
            invoice_amount: r.invoice_amount,
            status: r.status.parse()?,
            is_proposal: r.is_proposal,
            secret_code: r.secret_code,
            processor_invoice_id: r.processor_invoice_id,
            processor_customer_id: r.processor_customer_id,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: i64,
    title: String,
    description: String,
    main_image: Json<ImageRef>,
    additional_images: Json<Vec<ImageRef>>,
    created_at: OffsetDateTime,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            main_image: r.main_image.0,
            additional_images: r.additional_images.0,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuthCodeRow {
    email: String,
    code: String,
    issued_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_invoice(&self, new: NewInvoice) -> anyhow::Result<Invoice> {
        let amount = new.invoice_amount();
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            INSERT INTO invoices
                (customer_email, customer_name, description, lines, invoice_amount,
                 status, is_proposal, secret_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(&new.customer_email)
        .bind(&new.customer_name)
        .bind(&new.description)
        .bind(Json(&new.lines))
        .bind(amount)
        .bind(new.status.as_str())
        .bind(new.is_proposal)
        .bind(&new.secret_code)
        .fetch_one(&self.db)
        .await
        .context("insert invoice")?;
        row.try_into()
    }

    async fn get_invoice(&self, id: i64) -> anyhow::Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get invoice")?;
        row.map(Invoice::try_from).transpose()
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        before: Option<i64>,
        limit: i64,
    ) -> anyhow::Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE ($1::BIGINT IS NULL OR id < $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::DATE IS NULL OR (created_at AT TIME ZONE 'UTC')::date >= $3)
              AND ($4::DATE IS NULL OR (created_at AT TIME ZONE 'UTC')::date <= $4)
              AND ($5::BOOLEAN IS NULL OR is_proposal = $5)
            ORDER BY id DESC
            LIMIT $6
            "#
        ))
        .bind(before)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.is_proposal)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("list invoices")?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn update_invoice_status(
        &self,
        id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE invoices SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.db)
            .await
            .context("update invoice status")?;
        Ok(res.rows_affected() == 1)
    }

    async fn attach_processor_ids(
        &self,
        id: i64,
        processor_invoice_id: &str,
        processor_customer_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE invoices
               SET processor_invoice_id = $2, processor_customer_id = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(processor_invoice_id)
        .bind(processor_customer_id)
        .execute(&self.db)
        .await
        .context("attach processor ids")?;
        Ok(())
    }

    async fn promote_proposal(&self, id: i64) -> anyhow::Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            UPDATE invoices
               SET is_proposal = FALSE
             WHERE id = $1 AND is_proposal AND status = 'open'
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("promote proposal")?;
        row.map(Invoice::try_from).transpose()
    }

    async fn delete_invoice(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete invoice")?;
        Ok(())
    }

    async fn insert_project(&self, new: NewProject) -> anyhow::Result<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (title, description, main_image, additional_images)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, description, main_image, additional_images, created_at
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(Json(&new.main_image))
        .bind(Json(&new.additional_images))
        .fetch_one(&self.db)
        .await
        .context("insert project")?;
        Ok(row.into())
    }

    async fn get_project(&self, id: i64) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, title, description, main_image, additional_images, created_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get project")?;
        Ok(row.map(Project::from))
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, title, description, main_image, additional_images, created_at
            FROM projects
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list projects")?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
               SET title = $2, description = $3, main_image = $4, additional_images = $5
             WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(Json(&project.main_image))
        .bind(Json(&project.additional_images))
        .execute(&self.db)
        .await
        .context("update project")?;
        Ok(())
    }

    async fn delete_project(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete project")?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_image(&self, s3_key: &str, file_name: &str) -> anyhow::Result<Image> {
        let (id, s3_key, file_name, created_at) =
            sqlx::query_as::<_, (i64, String, String, OffsetDateTime)>(
                r#"
                INSERT INTO images (s3_key, file_name)
                VALUES ($1, $2)
                RETURNING id, s3_key, file_name, created_at
                "#,
            )
            .bind(s3_key)
            .bind(file_name)
            .fetch_one(&self.db)
            .await
            .context("insert image")?;
        Ok(Image {
            id,
            s3_key,
            file_name,
            created_at,
        })
    }

    async fn get_image(&self, id: i64) -> anyhow::Result<Option<Image>> {
        let row = sqlx::query_as::<_, (i64, String, String, OffsetDateTime)>(
            "SELECT id, s3_key, file_name, created_at FROM images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get image")?;
        Ok(row.map(|(id, s3_key, file_name, created_at)| Image {
            id,
            s3_key,
            file_name,
            created_at,
        }))
    }

    async fn list_images(&self) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query_as::<_, (i64, String, String, OffsetDateTime)>(
            "SELECT id, s3_key, file_name, created_at FROM images ORDER BY id DESC",
        )
        .fetch_all(&self.db)
        .await
        .context("list images")?;
        Ok(rows
            .into_iter()
            .map(|(id, s3_key, file_name, created_at)| Image {
                id,
                s3_key,
                file_name,
                created_at,
            })
            .collect())
    }

    async fn delete_image(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete image")?;
        Ok(res.rows_affected() > 0)
    }

    async fn put_auth_code(&self, code: &AuthCode) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_codes (email, code, issued_at, expires_at, failed_attempts)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (email) DO UPDATE
               SET code = EXCLUDED.code,
                   issued_at = EXCLUDED.issued_at,
                   expires_at = EXCLUDED.expires_at,
                   failed_attempts = 0
            "#,
        )
        .bind(&code.email)
        .bind(&code.code)
        .bind(code.issued_at)
        .bind(code.expires_at)
        .execute(&self.db)
        .await
        .context("upsert auth code")?;
        Ok(())
    }

    async fn get_auth_code(&self, email: &str) -> anyhow::Result<Option<AuthCode>> {
        let row = sqlx::query_as::<_, AuthCodeRow>(
            "SELECT email, code, issued_at, expires_at FROM auth_codes WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("get auth code")?;
        Ok(row.map(|r| AuthCode {
            email: r.email,
            code: r.code,
            issued_at: r.issued_at,
            expires_at: r.expires_at,
        }))
    }

    async fn delete_auth_code(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM auth_codes WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await
            .context("delete auth code")?;
        Ok(())
    }

    async fn record_failed_attempt(&self, email: &str) -> anyhow::Result<u32> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE auth_codes
               SET failed_attempts = failed_attempts + 1
             WHERE email = $1
            RETURNING failed_attempts
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("record failed login attempt")?;
        Ok(count.map_or(0, |c| c.max(0) as u32))
    }
}
