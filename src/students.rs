use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{Store, StudentStore};
use crate::models::{strip_reserved, Document, StudentRecord};
use crate::token::Subject;
use crate::{proceeds, Error, Payload};

pub async fn list_students(
    Extension(store): Extension<Store>,
    Extension(Subject(owner)): Extension<Subject>,
) -> Result<Json<Vec<StudentRecord>>, Error> {
    Ok(Json(store.list_students(owner).await?))
}

pub async fn create_student(
    Extension(store): Extension<Store>,
    Extension(Subject(owner)): Extension<Subject>,
    fields: Result<Json<Document>, JsonRejection>,
) -> Payload<CreatedStudent> {
    let Json(fields) = fields?;
    let student_id = store.insert_student(owner, &strip_reserved(fields)).await?;
    log::debug!("User {} added student {}", owner, student_id);
    proceeds(CreatedStudent {
        message: "Student Added successfully",
        student_id,
    })
}

/// An id the caller does not own reads as `null`, same as a missing one.
pub async fn read_student(
    Extension(store): Extension<Store>,
    Extension(Subject(owner)): Extension<Subject>,
    Path(id): Path<String>,
) -> Result<Json<Option<StudentRecord>>, Error> {
    let id = Uuid::from_str(&id)?;
    Ok(Json(store.find_student(owner, id).await?))
}

pub async fn update_student(
    Extension(store): Extension<Store>,
    Extension(Subject(owner)): Extension<Subject>,
    Path(id): Path<String>,
    fields: Result<Json<Document>, JsonRejection>,
) -> Payload<StudentMessage> {
    let id = Uuid::from_str(&id)?;
    let Json(fields) = fields?;
    if !store.update_student(owner, id, &strip_reserved(fields)).await? {
        log::debug!("User {} updated unknown student {}", owner, id);
    }
    proceeds(StudentMessage {
        message: "Data Updated Successfully",
    })
}

/// Deleting an id twice answers the same way both times.
pub async fn delete_student(
    Extension(store): Extension<Store>,
    Extension(Subject(owner)): Extension<Subject>,
    Path(id): Path<String>,
) -> Payload<StudentMessage> {
    let id = Uuid::from_str(&id)?;
    if !store.delete_student(owner, id).await? {
        log::debug!("User {} deleted unknown student {}", owner, id);
    }
    proceeds(StudentMessage {
        message: "Student Deleted Successfully",
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStudent {
    message: &'static str,
    student_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentMessage {
    message: &'static str,
}
