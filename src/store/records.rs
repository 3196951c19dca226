//! Domain record tables: patients, medicines, consultations.
//!
//! Rows keep the searchable fields in indexed columns and the full record as
//! serialized JSON beside them. Search results match what a linear
//! case-insensitive substring scan over the full record set would return.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub blood_pressure: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub heart_rate: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
  pub id: String,
  pub name: String,
  pub age: u32,
  pub phone: String,
  pub last_visit: String,
  pub conditions: Vec<String>,
  pub medications: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vitals: Option<Vitals>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRecord {
  pub id: String,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub generic_name: Option<String>,
  pub category: String,
  pub stock: bool,
  pub pharmacy: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<u32>,
  pub last_updated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsultationStatus {
  Pending,
  Completed,
  Queued,
}

impl ConsultationStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Completed => "completed",
      Self::Queued => "queued",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRecord {
  pub id: String,
  pub patient_id: String,
  pub symptoms: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub diagnosis: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prescription: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub follow_up: Option<String>,
  pub status: ConsultationStatus,
  pub timestamp: String,
}

impl Database {
  /// Seed the initial dataset if the store is empty.
  ///
  /// Returns true when seeding actually happened. Guarded by a row-count
  /// check so reopening the store never duplicates records.
  pub fn seed(&self) -> Result<bool> {
    let count: i64 = self
      .conn()?
      .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count patients: {}", e))?;

    if count > 0 {
      return Ok(false);
    }

    for patient in seed_patients() {
      self.add_patient(&patient)?;
    }
    for medicine in seed_medicines() {
      self.add_medicine(&medicine)?;
    }

    Ok(true)
  }

  /// Get a patient by id.
  pub fn get_patient(&self, id: &str) -> Result<Option<PatientRecord>> {
    let conn = self.conn()?;
    let data: Option<String> = conn
      .query_row(
        "SELECT data FROM patients WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to get patient {}: {}", id, e))?;

    match data {
      Some(json) => Ok(Some(
        serde_json::from_str(&json).map_err(|e| eyre!("Failed to parse patient {}: {}", id, e))?,
      )),
      None => Ok(None),
    }
  }

  /// Search patients by name or phone substring (case-insensitive).
  pub fn search_patients(&self, query: &str) -> Result<Vec<PatientRecord>> {
    let conn = self.conn()?;
    let pattern = format!("%{}%", query);

    let mut stmt = conn
      .prepare(
        "SELECT data FROM patients WHERE name LIKE ?1 OR phone LIKE ?1 ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare patient search: {}", e))?;

    let records = stmt
      .query_map(params![pattern], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to search patients: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|json| serde_json::from_str(&json).ok())
      .collect();

    Ok(records)
  }

  /// Insert or replace a patient.
  pub fn add_patient(&self, patient: &PatientRecord) -> Result<()> {
    let data = serde_json::to_string(patient)
      .map_err(|e| eyre!("Failed to serialize patient: {}", e))?;

    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO patients (id, name, phone, data) VALUES (?, ?, ?, ?)",
        params![patient.id, patient.name, patient.phone, data],
      )
      .map_err(|e| eyre!("Failed to store patient {}: {}", patient.id, e))?;

    Ok(())
  }

  /// Search medicines by name or category substring (case-insensitive).
  pub fn search_medicines(&self, query: &str) -> Result<Vec<MedicineRecord>> {
    let conn = self.conn()?;
    let pattern = format!("%{}%", query);

    let mut stmt = conn
      .prepare(
        "SELECT data FROM medicines WHERE name LIKE ?1 OR category LIKE ?1 ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare medicine search: {}", e))?;

    let records = stmt
      .query_map(params![pattern], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to search medicines: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|json| serde_json::from_str(&json).ok())
      .collect();

    Ok(records)
  }

  /// Get all medicines in a category (exact match, uses the index).
  pub fn medicines_by_category(&self, category: &str) -> Result<Vec<MedicineRecord>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare("SELECT data FROM medicines WHERE category = ? ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare category query: {}", e))?;

    let records = stmt
      .query_map(params![category], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to query medicines by category: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|json| serde_json::from_str(&json).ok())
      .collect();

    Ok(records)
  }

  /// Insert or replace a medicine.
  pub fn add_medicine(&self, medicine: &MedicineRecord) -> Result<()> {
    let data = serde_json::to_string(medicine)
      .map_err(|e| eyre!("Failed to serialize medicine: {}", e))?;

    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO medicines (id, name, category, data) VALUES (?, ?, ?, ?)",
        params![medicine.id, medicine.name, medicine.category, data],
      )
      .map_err(|e| eyre!("Failed to store medicine {}: {}", medicine.id, e))?;

    Ok(())
  }

  /// Flip a medicine's stock flag and refresh its last-updated timestamp.
  pub fn update_medicine_stock(&self, medicine_id: &str, in_stock: bool) -> Result<()> {
    let conn = self.conn()?;

    let data: Option<String> = conn
      .query_row(
        "SELECT data FROM medicines WHERE id = ?",
        params![medicine_id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to get medicine {}: {}", medicine_id, e))?;

    let json = data.ok_or_else(|| eyre!("Medicine not found: {}", medicine_id))?;
    let mut medicine: MedicineRecord = serde_json::from_str(&json)
      .map_err(|e| eyre!("Failed to parse medicine {}: {}", medicine_id, e))?;

    medicine.stock = in_stock;
    medicine.last_updated = Utc::now().to_rfc3339();

    let updated = serde_json::to_string(&medicine)
      .map_err(|e| eyre!("Failed to serialize medicine: {}", e))?;

    conn
      .execute(
        "UPDATE medicines SET data = ? WHERE id = ?",
        params![updated, medicine_id],
      )
      .map_err(|e| eyre!("Failed to update medicine {}: {}", medicine_id, e))?;

    Ok(())
  }

  /// Insert or replace a consultation.
  pub fn add_consultation(&self, consultation: &ConsultationRecord) -> Result<()> {
    let data = serde_json::to_string(consultation)
      .map_err(|e| eyre!("Failed to serialize consultation: {}", e))?;

    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO consultations (id, patient_id, status, data) VALUES (?, ?, ?, ?)",
        params![
          consultation.id,
          consultation.patient_id,
          consultation.status.as_str(),
          data
        ],
      )
      .map_err(|e| eyre!("Failed to store consultation {}: {}", consultation.id, e))?;

    Ok(())
  }

  /// Get all consultations for a patient (uses the index).
  pub fn consultations_by_patient(&self, patient_id: &str) -> Result<Vec<ConsultationRecord>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare("SELECT data FROM consultations WHERE patient_id = ? ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare consultation query: {}", e))?;

    let records = stmt
      .query_map(params![patient_id], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to query consultations: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|json| serde_json::from_str(&json).ok())
      .collect();

    Ok(records)
  }

  /// Record counts for the status report: (patients, medicines, consultations).
  pub fn record_counts(&self) -> Result<(i64, i64, i64)> {
    let conn = self.conn()?;
    let count = |table: &str| -> Result<i64> {
      conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to count {}: {}", table, e))
    };

    Ok((count("patients")?, count("medicines")?, count("consultations")?))
  }
}

/// Initial patients shipped with the kiosk.
fn seed_patients() -> Vec<PatientRecord> {
  vec![
    PatientRecord {
      id: "pat001".to_string(),
      name: "ਰਮਨਜੀਤ ਸਿੰਘ".to_string(),
      age: 45,
      phone: "9876543210".to_string(),
      last_visit: "2025-01-10".to_string(),
      conditions: vec!["ਹਾਈ ਬਲੱਡ ਪ੍ਰੈਸ਼ਰ".to_string(), "ਡਾਇਬੀਟਿਸ".to_string()],
      medications: vec!["Metformin".to_string(), "Amlodipine".to_string()],
      vitals: Some(Vitals {
        blood_pressure: Some("140/90".to_string()),
        temperature: Some(98.6),
        heart_rate: Some(75),
        weight: Some(70.0),
      }),
    },
    PatientRecord {
      id: "pat002".to_string(),
      name: "ਸੁਰਿੰਦਰ ਕੌਰ".to_string(),
      age: 38,
      phone: "9876543211".to_string(),
      last_visit: "2025-01-08".to_string(),
      conditions: vec!["ਅਸਥਮਾ".to_string()],
      medications: vec!["Salbutamol Inhaler".to_string()],
      vitals: Some(Vitals {
        blood_pressure: None,
        temperature: Some(99.1),
        heart_rate: Some(82),
        weight: None,
      }),
    },
    PatientRecord {
      id: "pat003".to_string(),
      name: "ਜਗਦੀਪ ਸਿੰਘ".to_string(),
      age: 62,
      phone: "9876543212".to_string(),
      last_visit: "2025-01-05".to_string(),
      conditions: vec!["ਆਰਥਰਾਇਟਿਸ".to_string(), "ਹਾਈ ਬਲੱਡ ਪ੍ਰੈਸ਼ਰ".to_string()],
      medications: vec!["Diclofenac".to_string(), "Lisinopril".to_string()],
      vitals: None,
    },
  ]
}

/// Initial medicine inventory shipped with the kiosk.
fn seed_medicines() -> Vec<MedicineRecord> {
  vec![
    MedicineRecord {
      id: "med001".to_string(),
      name: "Paracetamol".to_string(),
      generic_name: Some("Acetaminophen".to_string()),
      category: "ਦਰਦ ਦੀ ਦਵਾਈ".to_string(),
      stock: true,
      pharmacy: "Nabha Medical Store".to_string(),
      price: Some(15),
      last_updated: "2025-01-12".to_string(),
    },
    MedicineRecord {
      id: "med002".to_string(),
      name: "Metformin".to_string(),
      generic_name: Some("Metformin HCl".to_string()),
      category: "ਡਾਇਬੀਟਿਸ".to_string(),
      stock: true,
      pharmacy: "Punjab Pharmacy".to_string(),
      price: Some(45),
      last_updated: "2025-01-11".to_string(),
    },
    MedicineRecord {
      id: "med003".to_string(),
      name: "Amlodipine".to_string(),
      generic_name: Some("Amlodipine Besylate".to_string()),
      category: "ਬਲੱਡ ਪ੍ਰੈਸ਼ਰ".to_string(),
      stock: false,
      pharmacy: "Village Clinic".to_string(),
      price: Some(32),
      last_updated: "2025-01-10".to_string(),
    },
    MedicineRecord {
      id: "med004".to_string(),
      name: "Aspirin".to_string(),
      generic_name: Some("Acetylsalicylic Acid".to_string()),
      category: "ਦਰਦ ਦੀ ਦਵਾਈ".to_string(),
      stock: true,
      pharmacy: "Nabha Medical Store".to_string(),
      price: Some(18),
      last_updated: "2025-01-12".to_string(),
    },
    MedicineRecord {
      id: "med005".to_string(),
      name: "Salbutamol Inhaler".to_string(),
      generic_name: Some("Salbutamol Sulfate".to_string()),
      category: "ਸਾਹ ਦੀ ਬਿਮਾਰੀ".to_string(),
      stock: true,
      pharmacy: "Punjab Pharmacy".to_string(),
      price: Some(120),
      last_updated: "2025-01-11".to_string(),
    },
    MedicineRecord {
      id: "med006".to_string(),
      name: "Insulin".to_string(),
      generic_name: Some("Human Insulin".to_string()),
      category: "ਡਾਇਬੀਟਿਸ".to_string(),
      stock: true,
      pharmacy: "District Hospital".to_string(),
      price: Some(280),
      last_updated: "2025-01-09".to_string(),
    },
  ]
}
