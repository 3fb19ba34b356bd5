use std::collections::HashMap;

use crate::db::Database;

pub(crate) async fn names_by_ids(db: &Database, ids: &[String]) -> HashMap<String, String> {
    if ids.is_empty() {
        return HashMap::new();
    }

    let snapshot = db.read().await;
    snapshot
        .students
        .iter()
        .filter(|student| ids.contains(&student.id))
        .map(|student| (student.id.clone(), student.name.clone()))
        .collect()
}
