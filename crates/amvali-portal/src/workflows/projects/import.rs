use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{MunicipalityRegistration, ValidationError};

#[derive(Debug)]
pub enum MunicipalityImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, source: ValidationError },
}

impl std::fmt::Display for MunicipalityImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MunicipalityImportError::Io(err) => {
                write!(f, "failed to read municipality roster: {}", err)
            }
            MunicipalityImportError::Csv(err) => {
                write!(f, "invalid municipality CSV data: {}", err)
            }
            MunicipalityImportError::InvalidRow { line, source } => {
                write!(f, "municipality roster line {} rejected: {}", line, source)
            }
        }
    }
}

impl std::error::Error for MunicipalityImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MunicipalityImportError::Io(err) => Some(err),
            MunicipalityImportError::Csv(err) => Some(err),
            MunicipalityImportError::InvalidRow { source, .. } => Some(source),
        }
    }
}

impl From<std::io::Error> for MunicipalityImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for MunicipalityImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads a municipality roster export (`name,code,contact_email[,contact_phone]`).
///
/// Rows are validated like API registrations. Codes are compared case-insensitively and the
/// first row for a code wins.
pub struct MunicipalityImporter;

impl MunicipalityImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<MunicipalityRegistration>, MunicipalityImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(
        reader: R,
    ) -> Result<Vec<MunicipalityRegistration>, MunicipalityImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let mut record = csv::StringRecord::new();
        let mut seen = HashSet::new();
        let mut registrations = Vec::new();

        while csv_reader.read_record(&mut record)? {
            let line = record.position().map_or(0, |position| position.line());
            let row: RosterRow = record.deserialize(Some(&headers))?;
            let registration = MunicipalityRegistration {
                name: row.name,
                code: row.code.to_ascii_uppercase(),
                contact_email: row.contact_email,
                contact_phone: row.contact_phone,
            };
            registration
                .validate()
                .map_err(|source| MunicipalityImportError::InvalidRow { line, source })?;

            if seen.insert(registration.code.clone()) {
                registrations.push(registration);
            }
        }

        Ok(registrations)
    }
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    name: String,
    code: String,
    contact_email: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    contact_phone: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
