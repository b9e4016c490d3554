use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;
use serde::de::{SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{de, ser, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/******************************
 *
 * Endpoint ID
 *
 ******************************/

pub const ENDPOINT_URI_SCHEME_DTN: u8 = 1;
pub const ENDPOINT_URI_SCHEME_IPN: u8 = 2;

const DTN_NONE_SSP: &str = "none";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpnAddress(u64, u64);

impl IpnAddress {
    pub fn new(node: u64, service: u64) -> IpnAddress {
        IpnAddress(node, service)
    }
    pub fn node_number(&self) -> u64 {
        self.0
    }
    pub fn service_number(&self) -> u64 {
        self.1
    }
}
impl fmt::Display for IpnAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointIdError {
    #[error("scheme not found")]
    SchemeMissing,
    #[error("unknown address scheme `{0}`")]
    UnknownScheme(String),
    #[error("empty scheme specific part for scheme `{0}`")]
    EmptySsp(String),
    #[error("ipn address `{0}` is not of the form node.service")]
    InvalidIpnFormat(String),
    #[error("invalid number `{0}` in ipn address")]
    InvalidIpnNumber(String),
    #[error("invalid service endpoint `{0}`")]
    InvalidService(String),
    #[error("none endpoint can not have a service")]
    NoneHasNoService,
    #[error("endpoint with scheme `{0}` has no binary encoding")]
    UnencodableScheme(String),
    #[error("`dtn:none` must be the none endpoint, not a dtn name")]
    NoneAsName,
}

/// Represents an endpoint in various addressing schemes.
///
/// Either the *none* endpoint, a dtn one or an ipn endpoint. Endpoints of
/// other schemes only come out of [`EndpointID::parse_permissive`] and are
/// kept as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EndpointID {
    #[default]
    DtnNone,
    Dtn(String),
    Ipn(IpnAddress),
    Unknown { scheme: String, ssp: String },
}

impl Serialize for EndpointID {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        match self {
            EndpointID::DtnNone => {
                seq.serialize_element(&ENDPOINT_URI_SCHEME_DTN)?;
                seq.serialize_element(&0u8)?;
            }
            EndpointID::Dtn(ssp) => {
                seq.serialize_element(&ENDPOINT_URI_SCHEME_DTN)?;
                seq.serialize_element(ssp)?;
            }
            EndpointID::Ipn(addr) => {
                seq.serialize_element(&ENDPOINT_URI_SCHEME_IPN)?;
                seq.serialize_element(addr)?;
            }
            EndpointID::Unknown { scheme, .. } => {
                return Err(ser::Error::custom(EndpointIdError::UnencodableScheme(
                    scheme.clone(),
                )));
            }
        }
        seq.end()
    }
}

/// Second element of a dtn endpoint, either the integer 0 (`dtn:none`) or a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum DtnSsp {
    None(u64),
    Name(String),
}

impl<'de> Deserialize<'de> for EndpointID {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EndpointIDVisitor;

        impl<'de> Visitor<'de> for EndpointIDVisitor {
            type Value = EndpointID;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("EndpointID")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let eid_type: u64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let eid = if eid_type == ENDPOINT_URI_SCHEME_DTN as u64 {
                    match seq
                        .next_element::<DtnSsp>()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?
                    {
                        DtnSsp::None(0) => EndpointID::DtnNone,
                        DtnSsp::None(other) => {
                            return Err(de::Error::invalid_value(
                                de::Unexpected::Unsigned(other),
                                &"0 or a dtn name",
                            ))
                        }
                        DtnSsp::Name(name) => {
                            EndpointID::with_dtn(&name).map_err(de::Error::custom)?
                        }
                    }
                } else if eid_type == ENDPOINT_URI_SCHEME_IPN as u64 {
                    let addr: IpnAddress = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                    EndpointID::Ipn(addr)
                } else {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(eid_type),
                        &"dtn (1) or ipn (2) scheme code",
                    ));
                };
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(eid)
            }
        }

        deserializer.deserialize_any(EndpointIDVisitor)
    }
}

impl EndpointID {
    /// Default returns a `dtn:none` endpoint
    pub fn new() -> EndpointID {
        Default::default()
    }
    /// Create a new EndpointID with dtn addressing scheme from its
    /// scheme specific part, e.g., `//node1/incoming`.
    ///
    /// The name `none` yields the `dtn:none` endpoint.
    pub fn with_dtn(ssp: &str) -> Result<EndpointID, EndpointIdError> {
        if ssp == DTN_NONE_SSP {
            Ok(EndpointID::DtnNone)
        } else if ssp.is_empty() {
            Err(EndpointIdError::EmptySsp("dtn".to_string()))
        } else {
            Ok(EndpointID::Dtn(ssp.to_owned()))
        }
    }
    /// Create a new 'dtn:none' endpoint
    pub const fn none() -> EndpointID {
        EndpointID::DtnNone
    }

    /// Create a new EndpointID with ipn addressing scheme, e.g. `ipn:23.42`
    pub fn with_ipn(node: u64, service: u64) -> EndpointID {
        EndpointID::Ipn(IpnAddress::new(node, service))
    }

    /// Parse an endpoint from its text form `scheme:ssp`.
    ///
    /// Only the `dtn` and `ipn` schemes are accepted.
    pub fn parse(text: &str) -> Result<EndpointID, EndpointIdError> {
        parse_eid(text, false)
    }

    /// Like [`EndpointID::parse`] but keeps endpoints of unrecognized schemes
    /// as opaque text.
    pub fn parse_permissive(text: &str) -> Result<EndpointID, EndpointIdError> {
        parse_eid(text, true)
    }

    /// Generate a new Endpoint ID from existing one with a specific service endpoint
    ///
    /// Keeps scheme and host specific parts from original eid.
    ///
    /// # Examples
    ///
    /// ```
    /// use bp7::eid::*;
    ///
    /// let ipn_addr_1 = EndpointID::with_ipn(23, 42);
    /// let ipn_addr_2 = EndpointID::with_ipn(23, 7);
    /// assert_eq!(ipn_addr_1, ipn_addr_2.new_endpoint("42").unwrap());
    /// assert!(ipn_addr_1.new_endpoint("-42").is_err());
    ///
    /// let dtn_addr_1 = EndpointID::parse("dtn://node1/incoming").unwrap();
    /// let dtn_addr_2 = EndpointID::parse("dtn://node1/inbox").unwrap();
    /// assert_eq!(dtn_addr_1, dtn_addr_2.new_endpoint("incoming").unwrap());
    ///
    /// assert!(EndpointID::none().new_endpoint("incoming").is_err());
    /// ```
    pub fn new_endpoint(&self, ep: &str) -> Result<EndpointID, EndpointIdError> {
        match self {
            EndpointID::DtnNone => Err(EndpointIdError::NoneHasNoService),
            EndpointID::Ipn(addr) => {
                let service = parse_number(ep.trim())
                    .ok_or_else(|| EndpointIdError::InvalidService(ep.to_owned()))?;
                Ok(EndpointID::with_ipn(addr.node_number(), service))
            }
            EndpointID::Dtn(_) | EndpointID::Unknown { .. } => match self.node() {
                Some(node) => EndpointID::with_dtn(&format!("//{}/{}", node, ep)),
                None => Err(EndpointIdError::InvalidService(ep.to_owned())),
            },
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            EndpointID::DtnNone | EndpointID::Dtn(_) => "dtn",
            EndpointID::Ipn(_) => "ipn",
            EndpointID::Unknown { scheme, .. } => scheme,
        }
    }
    pub fn scheme_specific_part_dtn(&self) -> Option<&str> {
        match self {
            EndpointID::Dtn(ssp) => Some(ssp),
            _ => None,
        }
    }
    pub fn scheme_specific_part_ipn(&self) -> Option<IpnAddress> {
        match self {
            EndpointID::Ipn(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the plain node name without URL scheme
    pub fn node(&self) -> Option<String> {
        match self {
            EndpointID::DtnNone | EndpointID::Unknown { .. } => None,
            EndpointID::Dtn(ssp) => {
                let path = ssp.strip_prefix("//").unwrap_or(ssp);
                path.split('/')
                    .next()
                    .filter(|n| !n.is_empty())
                    .map(|n| n.to_string())
            }
            EndpointID::Ipn(addr) => Some(addr.node_number().to_string()),
        }
    }
    /// Returns the node id including URL scheme, `dtn://node/` or `ipn:node.0`
    pub fn node_id(&self) -> Option<String> {
        match self {
            EndpointID::Ipn(addr) => Some(format!("ipn:{}.0", addr.node_number())),
            EndpointID::Dtn(_) => Some(format!("dtn://{}/", self.node()?)),
            _ => None,
        }
    }

    pub fn is_node_id(&self) -> bool {
        match self {
            EndpointID::Dtn(ssp) => match self.node() {
                Some(node) => *ssp == format!("//{}/", node) || *ssp == format!("//{}", node),
                None => false,
            },
            EndpointID::Ipn(addr) => addr.service_number() == 0,
            _ => false,
        }
    }

    /// Checks whether the endpoint can be put on the wire.
    pub fn validate(&self) -> Result<(), EndpointIdError> {
        match self {
            EndpointID::Dtn(ssp) if ssp.is_empty() => {
                Err(EndpointIdError::EmptySsp("dtn".to_string()))
            }
            // would come back as DtnNone after decoding
            EndpointID::Dtn(ssp) if ssp == DTN_NONE_SSP => Err(EndpointIdError::NoneAsName),
            EndpointID::Unknown { scheme, .. } => {
                Err(EndpointIdError::UnencodableScheme(scheme.clone()))
            }
            _ => Ok(()),
        }
    }
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_eid(text: &str, allow_unknown: bool) -> Result<EndpointID, EndpointIdError> {
    let (scheme, ssp) = text
        .split_once(':')
        .filter(|(scheme, _)| !scheme.is_empty())
        .ok_or(EndpointIdError::SchemeMissing)?;
    match scheme {
        "dtn" => EndpointID::with_dtn(ssp),
        "ipn" => {
            let addr = ssp.strip_prefix("//").unwrap_or(ssp);
            let (node, service) = addr
                .split_once('.')
                .ok_or_else(|| EndpointIdError::InvalidIpnFormat(ssp.to_owned()))?;
            let node =
                parse_number(node).ok_or_else(|| EndpointIdError::InvalidIpnNumber(node.into()))?;
            let service = parse_number(service)
                .ok_or_else(|| EndpointIdError::InvalidIpnNumber(service.into()))?;
            Ok(EndpointID::with_ipn(node, service))
        }
        _ if allow_unknown => {
            if ssp.is_empty() {
                return Err(EndpointIdError::EmptySsp(scheme.to_owned()));
            }
            Ok(EndpointID::Unknown {
                scheme: scheme.to_owned(),
                ssp: ssp.to_owned(),
            })
        }
        _ => Err(EndpointIdError::UnknownScheme(scheme.to_owned())),
    }
}

impl fmt::Display for EndpointID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EndpointID::DtnNone => write!(f, "dtn:{}", DTN_NONE_SSP),
            EndpointID::Dtn(ssp) => write!(f, "dtn:{}", ssp),
            EndpointID::Ipn(addr) => write!(f, "ipn:{}", addr),
            EndpointID::Unknown { scheme, ssp } => write!(f, "{}:{}", scheme, ssp),
        }
    }
}

impl FromStr for EndpointID {
    type Err = EndpointIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointID::parse(s)
    }
}

/// Load EndpointID from URL string.
///
/// Support for ipn and dtn schemes.
impl TryFrom<String> for EndpointID {
    type Error = EndpointIdError;
    fn try_from(item: String) -> Result<Self, Self::Error> {
        EndpointID::parse(&item)
    }
}

impl TryFrom<&str> for EndpointID {
    type Error = EndpointIdError;
    fn try_from(item: &str) -> Result<Self, Self::Error> {
        EndpointID::parse(item)
    }
}
impl From<IpnAddress> for EndpointID {
    fn from(item: IpnAddress) -> Self {
        EndpointID::Ipn(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("//node1")]
    #[test_case("//node1/incoming")]
    fn create_with_dtn_tests(input: &str) {
        assert_eq!(
            EndpointID::with_dtn(input).unwrap(),
            EndpointID::Dtn(input.to_string())
        );
    }

    #[test_case("dtn://n1/incoming" => "dtn://n1/incoming" ; "when using fully qualified dtn endpoint")]
    #[test_case("dtn://n1/incoming/" => "dtn://n1/incoming/" ; "when containing tail slash")]
    #[test_case("dtn://n1/" => "dtn://n1/" ; "when providing node eid")]
    #[test_case("dtn:n1/incoming" => "dtn:n1/incoming" ; "when skipping double slash for dtn")]
    #[test_case("ipn:23.42" => "ipn:23.42" ; "when using valid ipn endpoint")]
    #[test_case("ipn:23.0" => "ipn:23.0" ; "when using service number 0")]
    #[test_case("ipn:0.0" => "ipn:0.0" ; "when using the null ipn endpoint")]
    #[test_case("ipn://23.42" => "ipn:23.42" ; "when using double slash for ipn")]
    #[test_case("dtn:none" => "dtn:none" ; "when using none endpoint")]
    fn from_str_tests(input_str: &str) -> String {
        EndpointID::try_from(input_str).unwrap().to_string()
    }

    #[test_case("dtn//n1/incoming" => EndpointIdError::SchemeMissing ; "when missing scheme separator")]
    #[test_case(":n1" => EndpointIdError::SchemeMissing ; "when scheme is empty")]
    #[test_case("http://n1" => EndpointIdError::UnknownScheme("http".into()) ; "when using unknown scheme")]
    #[test_case("dtn:" => EndpointIdError::EmptySsp("dtn".into()) ; "when dtn ssp is empty")]
    #[test_case("ipn:23" => EndpointIdError::InvalidIpnFormat("23".into()) ; "when service is missing")]
    #[test_case("ipn:23.data" => EndpointIdError::InvalidIpnNumber("data".into()) ; "when providing string as service number")]
    #[test_case("ipn:-1.2" => EndpointIdError::InvalidIpnNumber("-1".into()) ; "when node number is negative")]
    #[test_case("ipn:1.2.3" => EndpointIdError::InvalidIpnNumber("2.3".into()) ; "when there are three fields")]
    fn parse_error_tests(input_str: &str) -> EndpointIdError {
        EndpointID::parse(input_str).unwrap_err()
    }

    #[test]
    fn permissive_parse_keeps_unknown_scheme() {
        let eid = EndpointID::parse_permissive("http://example.org/x").unwrap();
        assert_eq!(
            eid,
            EndpointID::Unknown {
                scheme: "http".into(),
                ssp: "//example.org/x".into()
            }
        );
        assert_eq!(eid.to_string(), "http://example.org/x");
        assert!(eid.validate().is_err());
        assert!(serde_cbor::to_vec(&eid).is_err());
    }

    #[test]
    fn none_as_dtn_name_is_not_encodable() {
        let eid = EndpointID::Dtn("none".into());
        assert_eq!(eid.validate(), Err(EndpointIdError::NoneAsName));
        assert_eq!(EndpointID::with_dtn("none").unwrap(), EndpointID::DtnNone);
        assert!(EndpointID::DtnNone.validate().is_ok());
    }

    #[test_case("ipn:1.0" => true ; "when providing ipn node id")]
    #[test_case("ipn:1.1" => false ; "when providing full ipn address")]
    #[test_case("dtn://node1/" => true ; "when providing dtn node id")]
    #[test_case("dtn://node1/incoming" => false ; "when providing full dtn address")]
    #[test_case("dtn:none" => false ; "when providing none endpoint")]
    fn is_node_id_tests(eid: &str) -> bool {
        EndpointID::parse(eid).unwrap().is_node_id()
    }

    #[test_case("ipn:1.0" => Some("1".to_string()))]
    #[test_case("dtn://node1/incoming" => Some("node1".to_string()))]
    #[test_case("dtn://node1/" => Some("node1".to_string()))]
    #[test_case("dtn:none" => None)]
    fn node_part_tests(eid: &str) -> Option<String> {
        EndpointID::parse(eid).unwrap().node()
    }

    #[test_case("dtn:none" ; "when using none endpoint")]
    #[test_case("ipn:23.42" ; "when using ipn address")]
    #[test_case("dtn://node1/incoming" ; "when using dtn address")]
    fn serialize_deserialize_tests(eid: &str) {
        let eid = EndpointID::parse(eid).unwrap();
        let encoded_eid = serde_cbor::to_vec(&eid).expect("Error serializing packet as cbor.");
        assert_eq!(
            eid,
            serde_cbor::from_slice(&encoded_eid).expect("Decoding packet failed")
        );
    }

    #[test_case(&[130, 1, 0] => "dtn:none" ; "when decoding none endpoint")]
    #[test_case(&[130, 1, 104, 47, 47, 110, 111, 100, 101, 49, 47] => "dtn://node1/" ; "when decoding dtn node id")]
    #[test_case(&[130, 2, 130, 23, 24, 42] => "ipn:23.42" ; "when decoding ipn address")]
    fn test_de_eid(cbor_eid: &[u8]) -> String {
        let deserialized: EndpointID = serde_cbor::from_slice(cbor_eid).unwrap();
        deserialized.to_string()
    }

    #[test]
    fn ipn_encodes_minimal_integers() {
        let encoded = serde_cbor::to_vec(&EndpointID::with_ipn(23, 300)).unwrap();
        assert_eq!(encoded, vec![130, 2, 130, 23, 25, 1, 44]);
    }

    #[test_case(&[130, 3, 0] ; "when scheme code is unknown")]
    #[test_case(&[130, 1, 1] ; "when dtn none is not zero")]
    #[test_case(&[131, 1, 0, 0] ; "when there are trailing elements")]
    #[test_case(&[130, 2, 131, 1, 2, 3] ; "when ipn address has three numbers")]
    fn test_de_eid_rejects(cbor_eid: &[u8]) {
        assert!(serde_cbor::from_slice::<EndpointID>(cbor_eid).is_err());
    }
}
