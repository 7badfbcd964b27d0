//! Static registry of owner slots.
//!
//! Each (ownerType, item) pair names one JSON column of one owner table. The
//! registry is the only place that knows those table/column names, so the
//! SQL built here only ever interpolates identifiers checked at
//! construction.

use crate::services::error::{StorageError, StorageResult};
use crate::services::file_list::FileList;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// (ownerType, item, table, column)
const BUILTIN_SLOTS: &[(&str, &str, &str, &str)] = &[
    ("order", "files", "t_order", "files"),
    ("price", "files", "t_price", "files"),
    ("insureAttach", "files", "t_insure_attach", "files"),
    ("insuranceTypes", "files", "t_insurance_types", "files"),
    ("insuranceTypes", "OtherFiles", "t_insurance_types", "other_files"),
    (
        "insuranceTypes",
        "transfer_auth_files",
        "t_insurance_types",
        "transfer_auth_files",
    ),
    ("mistakeCorrect", "files", "t_mistake_correct", "files"),
    (
        "mistakeCorrect",
        "ApplicationFiles",
        "t_mistake_correct",
        "application_files",
    ),
    ("school", "CreditCodePic", "t_school", "credit_code_pic"),
    ("resource", "picture", "t_resource", "picture"),
    ("msg", "files", "t_msg", "files"),
    ("rptClaims", "BankCardPic", "t_report_claims", "bank_card_pic"),
    ("rptClaims", "InjuredIDPic", "t_report_claims", "injured_id_pic"),
    ("rptClaims", "GuardianIDPic", "t_report_claims", "guardian_id_pic"),
    ("rptClaims", "RelationProvePic", "t_report_claims", "relation_prove_pic"),
    ("rptClaims", "InvoicePic", "t_report_claims", "invoice_pic"),
    ("rptClaims", "BillsPic", "t_report_claims", "bills_pic"),
    ("rptClaims", "HospitalizedBillsPic", "t_report_claims", "hospitalized_bills_pic"),
    ("rptClaims", "MedicalRecordPic", "t_report_claims", "medical_record_pic"),
    ("rptClaims", "DiseaseDiagnosisPic", "t_report_claims", "disease_diagnosis_pic"),
    ("rptClaims", "DischargeAbstractPic", "t_report_claims", "discharge_abstract_pic"),
    ("rptClaims", "OtherPic", "t_report_claims", "other_pic"),
    ("rptClaims", "PaidNoticePic", "t_report_claims", "paid_notice_pic"),
    ("rptClaims", "ClaimApplyPic", "t_report_claims", "claim_apply_pic"),
    ("rptClaims", "EquityTransferFile", "t_report_claims", "equity_transfer_file"),
    ("rptClaims", "MatchProgrammePic", "t_report_claims", "match_programme_pic"),
    ("rptClaims", "PolicyFile", "t_report_claims", "policy_file"),
    ("rptClaims", "DisabilityCertificate", "t_report_claims", "disability_certificate"),
    ("rptClaims", "DeathCertificate", "t_report_claims", "death_certificate"),
    ("rptClaims", "StudentStatusCertificate", "t_report_claims", "student_status_certificate"),
    ("rptClaims", "OrgLicPic", "t_report_claims", "org_lic_pic"),
    ("rptClaims", "CourierSnPic", "t_report_claims", "courier_sn_pic"),
    ("rptClaims", "AddiPic", "t_report_claims", "addi_pic"),
    ("rptClaims", "DignosticInspectionPic", "t_report_claims", "dignostic_inspection_pic"),
];

/// One owner column holding an ordered file list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerSlot {
    pub owner_type: String,
    pub item: String,
    pub table: String,
    pub column: String,
}

impl OwnerSlot {
    pub fn new(
        owner_type: impl Into<String>,
        item: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            item: item.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// Read the list stored for owner row `link_id`.
    ///
    /// Returns NotFound when the owner row does not exist.
    pub async fn load(&self, conn: &mut SqliteConnection, link_id: i64) -> StorageResult<FileList> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", self.column, self.table);
        let row: Option<(Option<String>,)> = sqlx::query_as(&sql)
            .bind(link_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some((raw,)) => FileList::decode(raw.as_deref()),
            None => Err(StorageError::not_found(format!(
                "{}.{}.{} does not exist",
                self.owner_type, self.item, link_id
            ))),
        }
    }

    /// Overwrite the whole list of owner row `link_id` in one statement and
    /// return the number of rows touched.
    pub async fn store(
        &self,
        conn: &mut SqliteConnection,
        link_id: i64,
        list: &FileList,
    ) -> StorageResult<u64> {
        let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", self.table, self.column);
        let result = sqlx::query(&sql)
            .bind(list.encode()?)
            .bind(link_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone, Debug)]
pub struct OwnerRegistry {
    slots: HashMap<(String, String), OwnerSlot>,
}

impl OwnerRegistry {
    /// Registry of every owner kind the application stores files for.
    pub fn builtin() -> Self {
        let slots = BUILTIN_SLOTS
            .iter()
            .map(|(owner_type, item, table, column)| {
                OwnerSlot::new(*owner_type, *item, *table, *column)
            })
            .map(|slot| ((slot.owner_type.clone(), slot.item.clone()), slot))
            .collect();
        Self { slots }
    }

    /// Build a registry from explicit slots, rejecting unsafe identifiers and
    /// duplicate (ownerType, item) pairs.
    pub fn from_slots(slots: impl IntoIterator<Item = OwnerSlot>) -> StorageResult<Self> {
        let mut map = HashMap::new();
        for slot in slots {
            for ident in [&slot.table, &slot.column] {
                if !is_sql_identifier(ident) {
                    return Err(StorageError::validation(format!(
                        "invalid identifier `{}` for {}.{}",
                        ident, slot.owner_type, slot.item
                    )));
                }
            }
            let key = (slot.owner_type.clone(), slot.item.clone());
            if map.insert(key, slot.clone()).is_some() {
                return Err(StorageError::validation(format!(
                    "duplicate owner slot {}.{}",
                    slot.owner_type, slot.item
                )));
            }
        }
        Ok(Self { slots: map })
    }

    pub fn resolve(&self, owner_type: &str, item: &str) -> StorageResult<&OwnerSlot> {
        self.slots
            .get(&(owner_type.to_string(), item.to_string()))
            .ok_or_else(|| {
                StorageError::not_found(format!("no file list registered for {owner_type}.{item}"))
            })
    }

    pub fn slots(&self) -> impl Iterator<Item = &OwnerSlot> {
        self.slots.values()
    }
}

impl Default for OwnerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
