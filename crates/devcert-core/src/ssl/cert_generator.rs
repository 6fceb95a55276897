use log::debug;
use openssl::asn1::{
    Asn1Object,
    Asn1OctetString,
    Asn1Time,
};
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    ExtendedKeyUsage,
    KeyUsage,
    SubjectAlternativeName,
};
use openssl::x509::{
    X509Builder,
    X509Extension,
    X509Name,
    X509NameBuilder,
};
use time::{
    Date,
    Month,
    OffsetDateTime,
};

use crate::error::{
    DevCertError,
    Result,
};

/// Serial number of every development certificate this tool issues. Trust
/// stores are searched by it, so it must not change between releases.
pub const SERIAL_NUMBER: &str = "731c321744e34650a202e3ef91c3c1b9";
pub const COMMON_NAME: &str = "localhost";
pub const FRIENDLY_NAME: &str = "devcert Development Certificate";

const RSA_KEY_BITS: u32 = 2048;
const VALIDITY_YEARS: i32 = 3;
// PKCS#9 friendlyName.
const FRIENDLY_NAME_OID: &str = "1.2.840.113549.1.9.20";

#[derive(Clone, PartialEq, Eq)]
pub struct CertificatePair {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for CertificatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePair")
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Generates a fresh key pair and a self-signed `localhost` certificate valid
/// from now until the same instant three calendar years later.
pub fn generate() -> Result<CertificatePair> {
    generate_at(OffsetDateTime::now_utc())
}

pub fn generate_at(not_before: OffsetDateTime) -> Result<CertificatePair> {
    let key = PKey::from_rsa(Rsa::generate(RSA_KEY_BITS)?)?;
    let not_after = validity_end(not_before)?;

    let name = localhost_name()?;
    let serial = BigNum::from_hex_str(SERIAL_NUMBER)?.to_asn1_integer()?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = asn1_time(not_before)?;
    let not_after = asn1_time(not_after)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let subject_alt_name = SubjectAlternativeName::new()
        .dns(COMMON_NAME)
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(subject_alt_name)?;
    builder.append_extension(
        KeyUsage::new()
            .digital_signature()
            .key_encipherment()
            .data_encipherment()
            .build()?,
    )?;
    builder.append_extension(ExtendedKeyUsage::new().server_auth().build()?)?;
    builder.append_extension(friendly_name_extension()?)?;

    builder.sign(&key, MessageDigest::sha256())?;
    let certificate = builder.build();

    debug!(
        "Generated development certificate valid until {}",
        certificate.not_after()
    );

    Ok(CertificatePair {
        certificate_pem: pem_string(certificate.to_pem()?),
        private_key_pem: pem_string(key.private_key_to_pem_pkcs8()?),
    })
}

/// Adds three to the year. A February 29 start rolls over to March 1 when the
/// target year is not a leap year.
pub fn validity_end(start: OffsetDateTime) -> Result<OffsetDateTime> {
    let year = start.year() + VALIDITY_YEARS;
    match start.replace_year(year) {
        Ok(end) => Ok(end),
        Err(_) if start.month() == Month::February && start.day() == 29 => {
            Ok(start.replace_date(Date::from_calendar_date(year, Month::March, 1)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn localhost_name() -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, COMMON_NAME)?;
    Ok(name.build())
}

fn asn1_time(at: OffsetDateTime) -> Result<Asn1Time> {
    let seconds = libc::time_t::try_from(at.unix_timestamp()).map_err(|_| {
        DevCertError::Validity(format!("{} does not fit the platform time type", at))
    })?;
    Ok(Asn1Time::from_unix(seconds)?)
}

fn friendly_name_extension() -> Result<X509Extension> {
    let oid = Asn1Object::from_str(FRIENDLY_NAME_OID)?;
    let value = Asn1OctetString::new_from_bytes(&der_bmp_string(FRIENDLY_NAME))?;
    Ok(X509Extension::new_from_der(&oid, false, &value)?)
}

pub(crate) fn der_bmp_string(text: &str) -> Vec<u8> {
    let body: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();

    let mut der = vec![0x1e];
    match body.len() {
        len @ 0..=0x7f => der.push(len as u8),
        len @ 0x80..=0xff => der.extend([0x81, len as u8]),
        len => der.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    der.extend(body);
    der
}

fn pem_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
