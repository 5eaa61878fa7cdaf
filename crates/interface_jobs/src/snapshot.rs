//! Reference data read from a JSON snapshot
//!
//! The master-data system exports students and fee catalogs as one document:
//!
//! ```json
//! {
//!   "students": [
//!     { "id": "STU-0001", "name": "Asha", "class_id": "C1", "village_id": "V1", "uses_transport": true }
//!   ],
//!   "catalogs": [
//!     {
//!       "year_id": "2024-25",
//!       "terms": [{ "id": "T1", "name": "Term 1", "due_date": "2024-07-15", "amounts": { "C1": 500000 } }],
//!       "custom_fees": [],
//!       "transport": { "amounts": { "V1": 120000 } }
//!     }
//!   ]
//! }
//! ```
//!
//! Amounts are in minor units.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{DomainPort, PortError, StudentId, YearId};
use domain_ledger::{FeeCatalog, ReferenceData, Student, StudentQuery};

use crate::error::JobError;

/// On-disk layout of a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub catalogs: Vec<FeeCatalog>,
}

/// Read-only reference data loaded once from a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotReferenceData {
    students: HashMap<StudentId, Student>,
    catalogs: HashMap<YearId, FeeCatalog>,
}

impl SnapshotReferenceData {
    /// Reads and validates a snapshot file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| JobError::SnapshotIo {
                path: path.display().to_string(),
                source,
            })?;
        let data = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            students = data.students.len(),
            catalogs = data.catalogs.len(),
            "Loaded reference snapshot"
        );
        Ok(data)
    }

    pub fn from_json(raw: &str) -> Result<Self, JobError> {
        Self::from_document(serde_json::from_str(raw)?)
    }

    /// Rejects duplicate ids and invalid catalogs
    pub fn from_document(document: SnapshotDocument) -> Result<Self, JobError> {
        let mut students = HashMap::with_capacity(document.students.len());
        for student in document.students {
            if student.id.is_blank() {
                return Err(JobError::InvalidSnapshot("student with blank id".to_string()));
            }
            if students.contains_key(&student.id) {
                return Err(JobError::InvalidSnapshot(format!(
                    "duplicate student {}",
                    student.id
                )));
            }
            students.insert(student.id.clone(), student);
        }

        let mut catalogs = HashMap::with_capacity(document.catalogs.len());
        for catalog in document.catalogs {
            catalog.validate().map_err(|e| {
                JobError::InvalidSnapshot(format!("catalog {}: {}", catalog.year_id, e))
            })?;
            if catalogs.contains_key(&catalog.year_id) {
                return Err(JobError::InvalidSnapshot(format!(
                    "duplicate catalog {}",
                    catalog.year_id
                )));
            }
            catalogs.insert(catalog.year_id.clone(), catalog);
        }

        Ok(Self { students, catalogs })
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    pub fn has_catalog(&self, year_id: &YearId) -> bool {
        self.catalogs.contains_key(year_id)
    }
}

impl DomainPort for SnapshotReferenceData {}

#[async_trait]
impl ReferenceData for SnapshotReferenceData {
    async fn get_student(&self, id: &StudentId) -> Result<Student, PortError> {
        self.students
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Student", id))
    }

    async fn find_students(&self, query: &StudentQuery) -> Result<Vec<Student>, PortError> {
        Ok(query.apply(self.students.values()))
    }

    async fn fee_catalog(&self, year_id: &YearId) -> Result<FeeCatalog, PortError> {
        self.catalogs
            .get(year_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("FeeCatalog", year_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "students": [
            { "id": "STU-0002", "name": "Ravi", "class_id": "C1", "village_id": "V1" },
            { "id": "STU-0001", "name": "Asha", "class_id": "C1", "village_id": "V1", "uses_transport": true },
            { "id": "STU-0003", "name": "Meena", "class_id": "C2", "village_id": null, "is_active": false }
        ],
        "catalogs": [
            {
                "year_id": "2024-25",
                "terms": [{ "id": "T1", "name": "Term 1", "due_date": "2024-07-15", "amounts": { "C1": 500000 } }],
                "transport": { "amounts": { "V1": 120000 } }
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_students_are_listed_in_id_order() {
        let data = SnapshotReferenceData::from_json(SNAPSHOT).unwrap();

        let active = data.find_students(&StudentQuery::active()).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["STU-0001", "STU-0002"]);

        let page = data
            .find_students(&StudentQuery::active().page(1, 1))
            .await
            .unwrap();
        assert_eq!(page[0].id.as_str(), "STU-0002");
    }

    #[tokio::test]
    async fn test_defaults_fill_optional_fields() {
        let data = SnapshotReferenceData::from_json(SNAPSHOT).unwrap();

        let ravi = data.get_student(&"STU-0002".into()).await.unwrap();
        assert!(!ravi.uses_transport);
        assert!(ravi.is_active);

        let catalog = data.fee_catalog(&YearId::new("2024-25")).await.unwrap();
        assert_eq!(catalog.terms.len(), 1);
        assert!(catalog.terms[0].is_active);
        assert!(catalog.custom_fees.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let data = SnapshotReferenceData::from_json(SNAPSHOT).unwrap();

        let student = data.get_student(&"STU-9999".into()).await;
        assert!(matches!(student, Err(ref e) if e.is_not_found()));
        let catalog = data.fee_catalog(&YearId::new("2030-31")).await;
        assert!(matches!(catalog, Err(ref e) if e.is_not_found()));
    }

    #[test]
    fn test_duplicate_student_is_rejected() {
        let raw = r#"{ "students": [
            { "id": "STU-0001", "name": "A", "class_id": "C1", "village_id": null },
            { "id": "STU-0001", "name": "B", "class_id": "C1", "village_id": null }
        ] }"#;

        let result = SnapshotReferenceData::from_json(raw);
        assert!(matches!(result, Err(JobError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let result = SnapshotReferenceData::from_json("{ not json");
        assert!(matches!(result, Err(JobError::SnapshotFormat(_))));
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let result = SnapshotReferenceData::load("/nonexistent/reference.json").await;
        match result {
            Err(JobError::SnapshotIo { path, .. }) => assert!(path.contains("reference.json")),
            other => panic!("unexpected {:?}", other.map(|d| d.student_count())),
        }
    }
}
