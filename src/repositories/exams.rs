use crate::db::models::Exam;
use crate::db::Database;

pub(crate) async fn find_by_id(db: &Database, id: &str) -> Option<Exam> {
    db.read().await.exams.iter().find(|exam| exam.id == id).cloned()
}

pub(crate) async fn list_by_class(db: &Database, class_id: &str) -> Vec<Exam> {
    db.read().await.exams.iter().filter(|exam| exam.class_id == class_id).cloned().collect()
}
