use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use schoolhub_types::models::{Invoice, InvoiceStatus};

use crate::Database;
use crate::models::{date_col, enum_col, fmt_date, fmt_ts, opt_ts_col, placeholders, ts_col, uuid_col};

const INVOICE_COLUMNS: &str =
    "id, student_id, description, amount_cents, due_date, status, paid_at, created_at";

impl Database {
    pub fn insert_invoice(&self, school_id: Uuid, invoice: &Invoice) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invoices (id, school_id, student_id, description, amount_cents, due_date, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    invoice.id.to_string(),
                    school_id.to_string(),
                    invoice.student_id.to_string(),
                    &invoice.description,
                    invoice.amount_cents,
                    fmt_date(&invoice.due_date),
                    invoice.status.as_str(),
                    fmt_ts(&invoice.created_at),
                ),
            )?;
            Ok(())
        })
    }

    pub fn invoices_for_school(&self, school_id: Uuid) -> Result<Vec<Invoice>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM invoices WHERE school_id = ?1 ORDER BY due_date DESC",
                INVOICE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([school_id.to_string()], map_invoice)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Invoices billed to any of `student_ids`, earliest due first.
    /// With `outstanding_only`, paid invoices are left out.
    pub fn invoices_for_students(
        &self,
        student_ids: &[Uuid],
        outstanding_only: bool,
    ) -> Result<Vec<Invoice>> {
        if student_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let status_filter = if outstanding_only { "AND status != 'paid'" } else { "" };
            let sql = format!(
                "SELECT {} FROM invoices WHERE student_id IN ({}) {} ORDER BY due_date",
                INVOICE_COLUMNS,
                placeholders(student_ids.len()),
                status_filter
            );
            let params: Vec<String> = student_ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_invoice)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Settle an unpaid invoice belonging to `school_id`. Returns rows updated.
    pub fn mark_invoice_paid(&self, id: Uuid, school_id: Uuid, at: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE invoices SET status = 'paid', paid_at = ?3
                 WHERE id = ?1 AND school_id = ?2 AND status != 'paid'",
                (id.to_string(), school_id.to_string(), fmt_ts(&at)),
            )?;
            Ok(updated)
        })
    }
}

fn map_invoice(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: uuid_col(row, 0)?,
        student_id: uuid_col(row, 1)?,
        description: row.get(2)?,
        amount_cents: row.get(3)?,
        due_date: date_col(row, 4)?,
        status: enum_col::<InvoiceStatus>(row, 5)?,
        paid_at: opt_ts_col(row, 6)?,
        created_at: ts_col(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use schoolhub_types::models::Student;

    #[test]
    fn paying_an_invoice_hides_it_from_outstanding() {
        let db = Database::open_in_memory().unwrap();
        let school = Uuid::new_v4();
        db.create_school(school, "Riverside").unwrap();

        let student = Uuid::new_v4();
        db.insert_student(&Student {
            id: student,
            school_id: school,
            profile_id: None,
            parent_id: None,
            class_id: None,
            first_name: "Tomás".into(),
            last_name: "Reyes".into(),
            admission_number: "R-7".into(),
        })
        .unwrap();

        let invoice = Invoice {
            id: Uuid::new_v4(),
            student_id: student,
            description: "Term 1 tuition".into(),
            amount_cents: 125_000,
            due_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            status: InvoiceStatus::Pending,
            paid_at: None,
            created_at: Utc::now(),
        };
        db.insert_invoice(school, &invoice).unwrap();
        assert_eq!(db.invoices_for_students(&[student], true).unwrap().len(), 1);

        // Wrong school cannot settle it.
        assert_eq!(db.mark_invoice_paid(invoice.id, Uuid::new_v4(), Utc::now()).unwrap(), 0);

        assert_eq!(db.mark_invoice_paid(invoice.id, school, Utc::now()).unwrap(), 1);
        assert_eq!(db.mark_invoice_paid(invoice.id, school, Utc::now()).unwrap(), 0);
        assert!(db.invoices_for_students(&[student], true).unwrap().is_empty());

        let all = db.invoices_for_school(school).unwrap();
        assert_eq!(all[0].status, InvoiceStatus::Paid);
        assert!(all[0].paid_at.is_some());
    }
}
