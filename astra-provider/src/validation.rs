//! Attribute validators
//!
//! Name and identifier rules enforced by Astra, checked locally so a bad
//! value fails at plan time instead of after a create call.

use std::sync::LazyLock;

use astra_core::resource::Value;
use astra_core::schema::AttributeType;
use regex::Regex;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern")
});

static KEYSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_]{0,47}$").expect("keyspace pattern"));

static TENANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([a-z0-9-]{0,62}[a-z0-9])?$").expect("tenant pattern"));

static PULSAR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_=:.\-]+$").expect("pulsar name pattern"));

static CIDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})(/(\d{1,2}))?$").expect("cidr pattern")
});

pub fn is_uuid(s: &str) -> bool {
    UUID_RE.is_match(s)
}

pub fn is_keyspace_name(s: &str) -> bool {
    KEYSPACE_RE.is_match(s)
}

pub fn is_tenant_name(s: &str) -> bool {
    TENANT_RE.is_match(s)
}

pub fn is_pulsar_name(s: &str) -> bool {
    PULSAR_NAME_RE.is_match(s)
}

/// IPv4 address with an optional prefix length
pub fn is_cidr(s: &str) -> bool {
    let Some(caps) = CIDR_RE.captures(s) else {
        return false;
    };
    let octets_ok = (1..=4).all(|i| caps[i].parse::<u16>().is_ok_and(|o| o <= 255));
    let prefix_ok = caps
        .get(6)
        .is_none_or(|p| p.as_str().parse::<u8>().is_ok_and(|n| n <= 32));
    octets_ok && prefix_ok
}

fn check(value: &Value, valid: fn(&str) -> bool, what: &str) -> Result<(), String> {
    match value.as_str() {
        Some(s) if valid(s) => Ok(()),
        Some(s) => Err(format!("'{}' is not a valid {}", s, what)),
        None => Err(format!("expected a {}", what)),
    }
}

fn custom(name: &str, validate: fn(&Value) -> Result<(), String>) -> AttributeType {
    AttributeType::Custom {
        name: name.to_string(),
        base: Box::new(AttributeType::String),
        validate,
    }
}

pub fn uuid() -> AttributeType {
    custom("Uuid", |v| check(v, is_uuid, "UUID"))
}

pub fn keyspace_name() -> AttributeType {
    custom("KeyspaceName", |v| {
        check(
            v,
            is_keyspace_name,
            "keyspace name (letters, digits and underscores, at most 48 characters)",
        )
    })
}

/// Tables follow the same CQL identifier rules as keyspaces
pub fn table_name() -> AttributeType {
    custom("TableName", |v| check(v, is_keyspace_name, "table name"))
}

pub fn tenant_name() -> AttributeType {
    custom("TenantName", |v| {
        check(
            v,
            is_tenant_name,
            "tenant name (lowercase letters, digits and hyphens)",
        )
    })
}

pub fn pulsar_name() -> AttributeType {
    custom("PulsarName", |v| check(v, is_pulsar_name, "Pulsar name"))
}

pub fn cidr() -> AttributeType {
    custom("Cidr", |v| check(v, is_cidr, "IPv4 address or CIDR block"))
}
