//! Deliverable inserts shared by enquiry creation, conversion and the
//! deliverable routes.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::domain::deliverables::{Deliverable, NewDeliverable, DELIVERABLE_COLUMNS};

/// What a deliverable hangs off
#[derive(Debug, Clone, Copy)]
pub enum DeliverableOwner {
    Enquiry(Uuid),
    Project(Uuid),
}

impl DeliverableOwner {
    fn ids(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            Self::Enquiry(id) => (Some(id), None),
            Self::Project(id) => (None, Some(id)),
        }
    }
}

pub async fn insert_deliverable<'e, E>(
    executor: E,
    owner: DeliverableOwner,
    deliverable: &NewDeliverable,
) -> Result<Deliverable, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let (enquiry_id, project_id) = owner.ids();

    sqlx::query_as::<_, Deliverable>(&format!(
        r#"
        INSERT INTO deliverables
            (enquiry_id, project_id, name, frame_rate, aspect_ratio, width, height, duration, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        DELIVERABLE_COLUMNS
    ))
    .bind(enquiry_id)
    .bind(project_id)
    .bind(&deliverable.name)
    .bind(&deliverable.frame_rate)
    .bind(&deliverable.aspect_ratio)
    .bind(deliverable.width)
    .bind(deliverable.height)
    .bind(&deliverable.duration)
    .bind(&deliverable.description)
    .fetch_one(executor)
    .await
}
