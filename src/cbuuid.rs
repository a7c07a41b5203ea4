use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use uuid::Uuid;

use crate::btuuid::BluetoothUuidExt;
use crate::error::{Error, ErrorKind};

/// Suffix shared by every UUID derived from the Bluetooth Base UUID.
const BLUETOOTH_BASE_SUFFIX: &str = "-0000-1000-8000-00805F9B34FB";

/// A Bluetooth UUID that remembers the short form it can be written in.
///
/// Accepts the full 36-character hyphenated form, or a bare 4-hex-digit (16-bit)
/// or 8-hex-digit (32-bit) short form. Formatting prefers the short form: a UUID
/// parsed from a short form is written back exactly as given (uppercased), and a
/// full UUID following the Bluetooth Base UUID pattern is written in its short form.
///
/// Two `CbUuid`s are equal when their formatted strings are equal.
#[derive(Clone)]
pub struct CbUuid {
    uuid: Uuid,
    short_form: Option<String>,
}

impl CbUuid {
    /// Parses a UUID string. See the type documentation for the accepted forms.
    pub fn parse(text: &str) -> Result<Self, Error> {
        if text.len() == 36 {
            if let Ok(uuid) = Uuid::try_parse(text) {
                return Ok(Self::from_uuid(uuid));
            }
        }
        let trimmed = text.trim();
        if let Some(uuid) = expand_short_form(trimmed) {
            return Ok(Self {
                uuid,
                short_form: Some(trimmed.to_ascii_uppercase()),
            });
        }
        Err(Error::new(
            ErrorKind::InvalidParameter,
            None,
            format!("invalid Bluetooth UUID string: {text:?}"),
        ))
    }

    /// Wraps a 128-bit UUID, extracting the short form when it matches the Bluetooth Base UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let short_form = uuid.try_to_u32().map(|val| match u16::try_from(val) {
            Ok(val) => format!("{val:04X}"),
            Err(_) => format!("{val:08X}"),
        });
        Self { uuid, short_form }
    }

    /// Creates the UUID of a 16-bit assigned number.
    pub fn from_u16(val: u16) -> Self {
        Self::from_uuid(Uuid::from_u16(val))
    }

    /// The full 128-bit value.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The remembered or extracted short form, if there is one.
    pub fn short_form(&self) -> Option<&str> {
        self.short_form.as_deref()
    }

    /// The canonical string: the short form when known, otherwise the uppercased 128-bit form.
    pub fn uuid_string(&self) -> String {
        match &self.short_form {
            Some(short) => short.clone(),
            None => self.uuid.hyphenated().to_string().to_ascii_uppercase(),
        }
    }
}

fn expand_short_form(text: &str) -> Option<Uuid> {
    if !(text.len() == 4 || text.len() == 8) || !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let padded = if text.len() == 4 {
        format!("0000{text}")
    } else {
        text.to_owned()
    };
    Uuid::try_parse(&format!("{padded}{BLUETOOTH_BASE_SUFFIX}")).ok()
}

impl From<Uuid> for CbUuid {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<&CbUuid> for Uuid {
    fn from(value: &CbUuid) -> Self {
        value.uuid
    }
}

impl FromStr for CbUuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CbUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uuid_string())
    }
}

impl fmt::Debug for CbUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CbUuid({})", self.uuid_string())
    }
}

impl PartialEq for CbUuid {
    fn eq(&self, other: &Self) -> bool {
        self.uuid_string() == other.uuid_string()
    }
}

impl Eq for CbUuid {}

impl Hash for CbUuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid_string().hash(state);
    }
}

impl PartialEq<Uuid> for CbUuid {
    fn eq(&self, other: &Uuid) -> bool {
        *self == CbUuid::from_uuid(*other)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CbUuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uuid_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CbUuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CbUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}
