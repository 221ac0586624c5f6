//! Subject identity of issued certificates.
//!
//! The fields are descriptive only; nothing in the trust decision depends on them beyond the
//! leaf's issuer matching the root's subject byte for byte.

use crate::error::{crypto, Result};
use openssl::asn1::Asn1Type;
use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};

pub const DEFAULT_ORGANIZATION: &str = "Local CA - DEV ONLY NOT FOR PRD";
pub const DEFAULT_ORGANIZATIONAL_UNIT: &str = "DEVOPS";
pub const DEFAULT_COUNTRY: &str = "BR";
pub const DEFAULT_PROVINCE: &str = "MG";
pub const DEFAULT_LOCALITY: &str = "BH";
pub const DEFAULT_STREET_ADDRESS: &str = "N/A";
pub const DEFAULT_POSTAL_CODE: &str = "N/A";

/// Distinguished name fields. Empty fields are left out of the encoded name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub province: String,
    pub locality: String,
    pub street_address: String,
    pub postal_code: String,
}

impl SubjectIdentity {
    /// Identity of the root CA.
    pub fn root_default() -> Self {
        Self {
            common_name: String::new(),
            organization: DEFAULT_ORGANIZATION.to_string(),
            organizational_unit: DEFAULT_ORGANIZATIONAL_UNIT.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            province: DEFAULT_PROVINCE.to_string(),
            locality: DEFAULT_LOCALITY.to_string(),
            street_address: DEFAULT_STREET_ADDRESS.to_string(),
            postal_code: DEFAULT_POSTAL_CODE.to_string(),
        }
    }

    /// Simplified leaf identity: organization, country and common name.
    pub fn leaf(organization: &str, country: &str, common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            organization: organization.to_string(),
            country: country.to_string(),
            ..Self::default()
        }
    }

    /// Encode as an X.509 name, country first as is customary.
    pub fn to_x509_name(&self) -> Result<X509Name> {
        let mut name_builder = X509Name::builder().map_err(crypto("Failed to create name builder"))?;

        append(&mut name_builder, Nid::COUNTRYNAME, &self.country, "Failed to set country")?;
        append(
            &mut name_builder,
            Nid::STATEORPROVINCENAME,
            &self.province,
            "Failed to set state/province",
        )?;
        append(&mut name_builder, Nid::LOCALITYNAME, &self.locality, "Failed to set locality")?;
        append(
            &mut name_builder,
            Nid::STREETADDRESS,
            &self.street_address,
            "Failed to set street address",
        )?;
        append(
            &mut name_builder,
            Nid::POSTALCODE,
            &self.postal_code,
            "Failed to set postal code",
        )?;
        append(
            &mut name_builder,
            Nid::ORGANIZATIONNAME,
            &self.organization,
            "Failed to set organization",
        )?;
        append(
            &mut name_builder,
            Nid::ORGANIZATIONALUNITNAME,
            &self.organizational_unit,
            "Failed to set organizational unit",
        )?;
        append(&mut name_builder, Nid::COMMONNAME, &self.common_name, "Failed to set CN")?;

        Ok(name_builder.build())
    }
}

fn append(
    builder: &mut X509NameBuilder,
    nid: Nid,
    value: &str,
    step: &'static str,
) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if nid == Nid::COMMONNAME {
        // Typed UTF8String bypasses OpenSSL's 64-character commonName limit
        return builder
            .append_entry_by_nid_with_type(nid, value, Asn1Type::UTF8STRING)
            .map_err(crypto(step));
    }
    builder.append_entry_by_nid(nid, value).map_err(crypto(step))
}
