/// Identifier for a spooled job
///
/// A ULID doubles as the job's filename stem, so ids sort by creation time
/// and are safe to join onto the spool directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpooledJobId {
    id: ulid::Ulid,
}

/// Extension of a queued job file
pub(crate) const JOB_EXTENSION: &str = ".job";

/// Extension of a job file currently owned by a worker
pub(crate) const IN_FLIGHT_EXTENSION: &str = ".job.inflight";

impl SpooledJobId {
    /// Parse a job ID from a filename like `01ARYZ6S41....job` or `....job.inflight`
    ///
    /// # Security
    /// Rejects path separators, `..` and anything that is not a ULID so a
    /// crafted filename can never point outside the spool.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename
            .strip_suffix(IN_FLIGHT_EXTENSION)
            .or_else(|| filename.strip_suffix(JOB_EXTENSION))?;

        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    pub(crate) fn job_filename(&self) -> String {
        format!("{}{JOB_EXTENSION}", self.id)
    }

    pub(crate) fn in_flight_filename(&self) -> String {
        format!("{}{IN_FLIGHT_EXTENSION}", self.id)
    }
}

impl std::fmt::Display for SpooledJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for SpooledJobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self::new)
    }
}

impl serde::Serialize for SpooledJobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SpooledJobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spooled_job_id_validation() {
        assert!(SpooledJobId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.job").is_some());
        assert!(SpooledJobId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.job.inflight").is_some());

        assert!(SpooledJobId::from_filename("../etc/passwd.job").is_none());
        assert!(SpooledJobId::from_filename("foo/bar.job").is_none());
        assert!(SpooledJobId::from_filename("..\\windows\\system32.job").is_none());

        assert!(SpooledJobId::from_filename("not_a_valid_ulid.job").is_none());
        assert!(SpooledJobId::from_filename(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.job").is_none());
        assert!(SpooledJobId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_none());
    }

    #[test]
    fn test_filenames_round_trip() {
        let id = SpooledJobId::generate();
        assert_eq!(SpooledJobId::from_filename(&id.job_filename()), Some(id.clone()));
        assert_eq!(SpooledJobId::from_filename(&id.in_flight_filename()), Some(id));
    }
}
