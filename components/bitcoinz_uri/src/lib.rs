//! Parsing and rendering of BitcoinZ payment request URIs.
//!
//! A payment request names a single recipient and optionally an amount, a memo and
//! human-readable annotations:
//!
//! ```text
//! bitcoinz:<address>?amount=<decimal>&memo=<percent-encoded>&label=<...>&message=<...>
//! ```
//!
//! The query grammar follows the `qchar` rules of ZIP 321, with the difference that memos are
//! carried as percent-encoded UTF-8 text rather than base64.
use core::fmt::{self, Display};

use nom::{
    character::complete::char, combinator::all_consuming, multi::separated_list0,
    sequence::preceded,
};

use bitcoinz_protocol::{
    address::AddressKind,
    memo::{self, Memo},
    value::Zatoshis,
};

/// The URI scheme of BitcoinZ payment requests.
pub const SCHEME: &str = "bitcoinz";

/// Errors that may be produced in decoding of payment requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The request did not name a recipient address.
    RecipientMissing,
    /// The recipient is not recognizable as a BitcoinZ address.
    InvalidAddress(String),
    /// A memo value exceeded 512 bytes in length.
    MemoBytesError(memo::Error),
    /// The request attempted to include a memo for a transparent recipient address, which is
    /// not supported by the protocol.
    TransparentMemo,
    /// The named parameter appeared more than once.
    DuplicateParameter(String),
    /// A `req-` parameter that this implementation does not understand was present.
    UnknownRequiredParameter(String),
    /// The URI was malformed and failed to parse.
    ParseError(String),
}

impl Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::RecipientMissing => write!(f, "Payment request has no recipient address"),
            UriError::InvalidAddress(addr) => {
                write!(f, "Could not interpret {addr} as a valid BitcoinZ address")
            }
            UriError::MemoBytesError(err) => {
                write!(f, "Memo exceeded maximum length: {err}")
            }
            UriError::TransparentMemo => write!(
                f,
                "Payment request is invalid: cannot send a memo to a transparent recipient address"
            ),
            UriError::DuplicateParameter(name) => {
                write!(f, "Parameter {name} appears more than once")
            }
            UriError::UnknownRequiredParameter(name) => {
                write!(f, "Required parameter {name} not recognized")
            }
            UriError::ParseError(s) => write!(f, "Parse failure: {s}"),
        }
    }
}

impl std::error::Error for UriError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UriError::MemoBytesError(err) => Some(err),
            _ => None,
        }
    }
}

/// A request for a single payment to a wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// The address to which the payment should be sent.
    address: String,
    /// The pool of [`address`], as recognized by the address heuristic.
    ///
    /// [`address`]: #structfield.address
    kind: AddressKind,
    /// The amount of the payment that is being requested, if any. Never zero.
    amount: Option<Zatoshis>,
    /// A memo that, if included, must be provided with the payment.
    memo: Option<Memo>,
    /// A human-readable label for the recipient.
    label: Option<String>,
    /// A human-readable message describing the purpose of this payment.
    message: Option<String>,
    /// A list of other arbitrary key/value pairs associated with this payment.
    other_params: Vec<(String, String)>,
}

impl PaymentRequest {
    /// Constructs a new [`PaymentRequest`].
    ///
    /// A zero amount is treated as "no amount requested". Returns an error if the address is
    /// not recognized or if a memo is requested for a transparent recipient.
    pub fn new(
        address: &str,
        amount: Option<Zatoshis>,
        memo: Option<Memo>,
    ) -> Result<Self, UriError> {
        if address.is_empty() {
            return Err(UriError::RecipientMissing);
        }
        let kind = AddressKind::detect(address)
            .ok_or_else(|| UriError::InvalidAddress(address.to_string()))?;
        if memo.is_some() && !kind.can_receive_memo() {
            return Err(UriError::TransparentMemo);
        }

        Ok(PaymentRequest {
            address: address.to_string(),
            kind,
            amount: amount.filter(|a| a.is_positive()),
            memo,
            label: None,
            message: None,
            other_params: vec![],
        })
    }

    /// Attaches a label for the recipient.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a message describing the purpose of the payment.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches an additional parameter. The name must not be one of the reserved parameter
    /// names and must match `[a-zA-Z][a-zA-Z0-9+-]*`.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.other_params.push((name.into(), value.into()));
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn amount(&self) -> Option<Zatoshis> {
        self.amount
    }

    pub fn memo(&self) -> Option<&Memo> {
        self.memo.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn other_params(&self) -> &[(String, String)] {
        &self.other_params
    }

    /// Convert this request to a URI string.
    pub fn to_uri(&self) -> String {
        let query_params = std::iter::empty()
            .chain(self.amount.map(render::amount_param))
            .chain(self.memo.as_ref().map(|m| render::str_param("memo", m)))
            .chain(self.label.as_ref().map(|l| render::str_param("label", l)))
            .chain(self.message.as_ref().map(|m| render::str_param("message", m)))
            .chain(
                self.other_params
                    .iter()
                    .map(|(name, value)| render::str_param(name, value)),
            )
            .collect::<Vec<String>>();

        if query_params.is_empty() {
            format!("{}:{}", SCHEME, self.address)
        } else {
            format!("{}:{}?{}", SCHEME, self.address, query_params.join("&"))
        }
    }

    /// Parse the provided URI to a payment request value.
    pub fn from_uri(uri: &str) -> Result<Self, UriError> {
        // Parse the leading bitcoinz:<address>
        let (rest, address) =
            parse::lead_addr(uri).map_err(|e| UriError::ParseError(e.to_string()))?;

        // Parse the remaining parameters as an undifferentiated list
        let (_, params) = if rest.is_empty() {
            ("", vec![])
        } else {
            all_consuming(preceded(
                char('?'),
                separated_list0(char('&'), parse::uriparam),
            ))(rest)
            .map_err(|e| UriError::ParseError(e.to_string()))?
        };

        let mut request = PaymentRequest::new(address, None, None)?;
        let mut seen: Vec<parse::Param> = Vec::with_capacity(params.len());
        for (name, value) in params {
            let param = parse::to_param(name, value)?;
            if parse::has_duplicate_param(&seen, &param) {
                return Err(UriError::DuplicateParameter(param.name().to_string()));
            }
            match &param {
                parse::Param::Amount(a) => request.amount = Some(*a).filter(|a| a.is_positive()),
                parse::Param::Memo(m) => {
                    if !request.kind.can_receive_memo() {
                        return Err(UriError::TransparentMemo);
                    }
                    request.memo = Some(m.clone());
                }
                parse::Param::Label(l) => request.label = Some(l.clone()),
                parse::Param::Message(m) => request.message = Some(m.clone()),
                parse::Param::Other(n, v) => request.other_params.push((n.clone(), v.clone())),
            }
            seen.push(param);
        }

        Ok(request)
    }
}

impl Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl core::str::FromStr for PaymentRequest {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentRequest::from_uri(s)
    }
}

pub(crate) mod render {
    use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

    use bitcoinz_protocol::value::{format_coins, Zatoshis};

    /// The set of ASCII characters that must be percent-encoded. This is the complement of
    /// the subset of ASCII characters defined by `qchar`
    ///
    //      unreserved      = ALPHA / DIGIT / "-" / "." / "_" / "~"
    //      allowed-delims  = "!" / "$" / "'" / "(" / ")" / "*" / "+" / "," / ";"
    //      qchar           = unreserved / pct-encoded / allowed-delims / ":" / "@"
    pub const QCHAR_ENCODE: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'#')
        .add(b'%')
        .add(b'&')
        .add(b'/')
        .add(b'<')
        .add(b'=')
        .add(b'>')
        .add(b'?')
        .add(b'[')
        .add(b'\\')
        .add(b']')
        .add(b'^')
        .add(b'`')
        .add(b'{')
        .add(b'|')
        .add(b'}');

    /// Constructs an "amount" key/value pair containing the decimal BTCZ amount.
    pub fn amount_param(amount: Zatoshis) -> String {
        format!("amount={}", format_coins(amount))
    }

    /// Utility function for an arbitrary string key/value pair.
    pub fn str_param(label: &str, value: &str) -> String {
        format!("{}={}", label, utf8_percent_encode(value, QCHAR_ENCODE))
    }
}

pub(crate) mod parse {
    use nom::{
        bytes::complete::{tag_no_case, take_till},
        character::complete::{alpha1, char, digit1},
        combinator::{all_consuming, map_opt, map_res, opt, recognize},
        sequence::{preceded, separated_pair, tuple},
        AsChar, IResult, InputTakeAtPosition,
    };
    use percent_encoding::percent_decode;

    use bitcoinz_protocol::{
        memo::Memo,
        value::{Zatoshis, COIN_DECIMALS},
    };

    use super::{UriError, SCHEME};

    /// A data type that defines the possible parameter types which may occur within a
    /// payment request URI.
    #[derive(Debug, PartialEq, Eq)]
    pub enum Param {
        Amount(Zatoshis),
        Memo(Memo),
        Label(String),
        Message(String),
        Other(String, String),
    }

    impl Param {
        pub fn name(&self) -> &str {
            match self {
                Param::Amount(_) => "amount",
                Param::Memo(_) => "memo",
                Param::Label(_) => "label",
                Param::Message(_) => "message",
                Param::Other(n, _) => n,
            }
        }
    }

    /// Utility function for determining whether a newly parsed param is a duplicate
    /// of a previous parameter.
    pub fn has_duplicate_param(v: &[Param], p: &Param) -> bool {
        v.iter().any(|p0| p0.name() == p.name())
    }

    /// Parses and consumes the leading "bitcoinz:\[address\]" from a URI.
    pub fn lead_addr(input: &str) -> IResult<&str, &str> {
        preceded(
            tuple((tag_no_case(SCHEME), char(':'))),
            take_till(|c| c == '?'),
        )(input)
    }

    /// The primary parser for <name>=<value> query-string parameter pair.
    ///
    /// Values are returned still percent-encoded; [`to_param`] interprets them.
    pub fn uriparam(input: &str) -> IResult<&str, (&str, &str)> {
        separated_pair(paramname, char('='), recognize(qchars))(input)
    }

    /// Extension for the `alphanumeric0` parser which extends that parser
    /// by also permitting the characters that are members of the `allowed`
    /// string.
    fn alphanum_or(allowed: &str) -> impl (Fn(&str) -> IResult<&str, &str>) + '_ {
        move |input| {
            input.split_at_position_complete(|item| {
                let c = item.as_char();
                !(c.is_alphanum() || allowed.contains(c))
            })
        }
    }

    /// Parses valid characters which may appear in parameter values.
    pub fn qchars(input: &str) -> IResult<&str, &str> {
        alphanum_or("-._~!$'()*+,;:@%")(input)
    }

    /// Parses valid characters that may appear in parameter names.
    pub fn namechars(input: &str) -> IResult<&str, &str> {
        alphanum_or("+-")(input)
    }

    /// Parses a parameter name.
    pub fn paramname(input: &str) -> IResult<&str, &str> {
        recognize(tuple((alpha1, namechars)))(input)
    }

    /// Parses a value in decimal BTCZ.
    pub fn parse_amount(input: &str) -> IResult<&str, Zatoshis> {
        map_res(
            tuple((
                digit1,
                opt(preceded(
                    char('.'),
                    map_opt(digit1, |s: &str| {
                        if s.len() > COIN_DECIMALS {
                            None
                        } else {
                            Some(s)
                        }
                    }),
                )),
            )),
            |(whole_s, decimal_s): (&str, Option<&str>)| {
                let coins: u64 = whole_s.parse::<u64>().map_err(|e| e.to_string())?;

                let zats: u64 = match decimal_s {
                    Some(d) => format!("{:0<8}", d)
                        .parse::<u64>()
                        .map_err(|e| e.to_string())?,
                    None => 0,
                };

                Zatoshis::from_coins_and_remainder(coins, zats)
                    .map_err(|_| format!("Not a valid zat amount: {}.{:0>8}", coins, zats))
            },
        )(input)
    }

    fn decode_str(value: &str) -> Result<String, UriError> {
        percent_decode(value.as_bytes())
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|e| UriError::ParseError(e.to_string()))
    }

    /// Interprets a raw query parameter.
    pub fn to_param(name: &str, value: &str) -> Result<Param, UriError> {
        match name {
            "amount" => all_consuming(parse_amount)(value)
                .map(|(_, a)| Param::Amount(a))
                .map_err(|e| UriError::ParseError(format!("Invalid amount {value}: {e}"))),

            "memo" => decode_str(value)
                .and_then(|text| Memo::try_from(text).map_err(UriError::MemoBytesError))
                .map(Param::Memo),

            "label" => decode_str(value).map(Param::Label),

            "message" => decode_str(value).map(Param::Message),

            other if other.starts_with("req-") => {
                Err(UriError::UnknownRequiredParameter(other.to_string()))
            }

            other => decode_str(value).map(|s| Param::Other(other.to_string(), s)),
        }
    }

    #[cfg(test)]
    mod tests {
        use nom::combinator::all_consuming;

        use super::{paramname, parse_amount, to_param, uriparam, Param};
        use bitcoinz_protocol::value::{Zatoshis, COIN};

        #[test]
        fn amounts() {
            assert_eq!(parse_amount("1").unwrap().1, Zatoshis::const_from_u64(COIN));
            assert_eq!(
                parse_amount("123.456").unwrap().1,
                Zatoshis::const_from_u64(12_345_600_000)
            );
            assert!(parse_amount("-1").is_err());
            assert!(all_consuming(parse_amount)("0.123456789").is_err());
            assert!(all_consuming(parse_amount)("123.").is_err());
        }

        #[test]
        fn empty_message() {
            let (rest, (name, value)) = uriparam("message=").unwrap();
            assert_eq!(rest, "");
            assert_eq!(to_param(name, value), Ok(Param::Message("".to_string())));
        }

        #[test]
        fn param_names() {
            assert_eq!(paramname("x-custom=1").unwrap(), ("=1", "x-custom"));
            assert!(paramname("9lives").is_err());
        }
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::collection::vec;
    use proptest::option;
    use proptest::prelude::{any, prop_compose, Strategy};

    use bitcoinz_protocol::{
        address::testing::arb_address, memo::testing::arb_memo, value::testing::arb_zatoshis,
    };

    use super::PaymentRequest;

    pub const VALID_PARAMNAME: &str = "[a-zA-Z][a-zA-Z0-9+-]*";

    const RESERVED: [&str; 5] = ["amount", "memo", "label", "message", "address"];

    pub fn arb_other_param_name() -> impl Strategy<Value = String> {
        VALID_PARAMNAME.prop_filter("reserved parameter name", |name| {
            !RESERVED.contains(&name.as_str()) && !name.starts_with("req-")
        })
    }

    prop_compose! {
        pub fn arb_payment_request()(
            address in arb_address(),
            amount in option::of(arb_zatoshis()),
            memo in option::of(arb_memo()),
            label in option::of(any::<String>()),
            message in option::of(any::<String>()),
            others in vec((arb_other_param_name(), any::<String>()), 0..3),
        ) -> PaymentRequest {
            let mut req = PaymentRequest::new(&address, amount, None).unwrap();
            if req.kind().can_receive_memo() {
                req.memo = memo;
            }
            req.label = label;
            req.message = message;
            // Parameter names must be unique within a request.
            for (name, value) in others {
                if !req.other_params.iter().any(|(n, _)| n == &name) {
                    req.other_params.push((name, value));
                }
            }
            req
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::proptest;

    use bitcoinz_protocol::{
        address::AddressKind,
        memo::Memo,
        value::{Zatoshis, COIN},
    };

    use super::{testing::arb_payment_request, PaymentRequest, UriError};

    const T_ADDR: &str = "t1XgfkH3GVD2Yv8kAn8RkSeLiPXWSpcqy4M";
    const Z_ADDR: &str =
        "zs1m2l5e9c4h6mjq0cfvx7k0ym6p9k5w0d2pq0u3d5u2tqyqvfz9u5x3xj7t9l4pz0uf6t8y9qlwnf";

    #[test]
    fn render_address_only() {
        let req = PaymentRequest::new(T_ADDR, None, None).unwrap();
        assert_eq!(req.to_uri(), format!("bitcoinz:{}", T_ADDR));
    }

    #[test]
    fn render_amount_and_memo() {
        let memo: Memo = "Thank you for your purchase".parse().unwrap();
        let req = PaymentRequest::new(
            Z_ADDR,
            Some(Zatoshis::const_from_u64(COIN + 1000)),
            Some(memo),
        )
        .unwrap();
        assert_eq!(
            req.to_uri(),
            format!(
                "bitcoinz:{}?amount=1.00001&memo=Thank%20you%20for%20your%20purchase",
                Z_ADDR
            )
        );
    }

    #[test]
    fn zero_amount_is_omitted() {
        let req = PaymentRequest::new(T_ADDR, Some(Zatoshis::ZERO), None).unwrap();
        assert_eq!(req.amount(), None);
        assert_eq!(req.to_uri(), format!("bitcoinz:{}", T_ADDR));
    }

    #[test]
    fn parse_simple() {
        let uri = format!(
            "bitcoinz:{}?amount=12.5&memo=Rent%20for%20March&message=",
            Z_ADDR
        );
        let req = PaymentRequest::from_uri(&uri).unwrap();
        assert_eq!(req.address(), Z_ADDR);
        assert_eq!(req.kind(), AddressKind::Shielded);
        assert_eq!(req.amount(), Some(Zatoshis::const_from_u64(1_250_000_000)));
        assert_eq!(req.memo().map(|m| m.as_str()), Some("Rent for March"));
        assert_eq!(req.message(), Some(""));
    }

    #[test]
    fn parse_scheme_case_insensitive() {
        let uri = format!("BitcoinZ:{}?amount=1", T_ADDR);
        assert_eq!(
            PaymentRequest::from_uri(&uri).unwrap().amount(),
            Some(Zatoshis::const_from_u64(COIN))
        );
    }

    #[test]
    fn parse_keeps_other_params_in_order() {
        let uri = format!("bitcoinz:{}?b=2&a=1", T_ADDR);
        let req = PaymentRequest::from_uri(&uri).unwrap();
        assert_eq!(
            req.other_params(),
            &[
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn invalid_examples() {
        // empty string
        assert!(PaymentRequest::from_uri("").is_err());

        // wrong scheme
        assert!(PaymentRequest::from_uri(&format!("zcash:{}", T_ADDR)).is_err());

        // missing address
        assert_matches!(
            PaymentRequest::from_uri("bitcoinz:?amount=1"),
            Err(UriError::RecipientMissing)
        );

        // unrecognized address
        assert_matches!(
            PaymentRequest::from_uri("bitcoinz:t1short?amount=1"),
            Err(UriError::InvalidAddress(_))
        );

        // duplicate amount
        assert_matches!(
            PaymentRequest::from_uri(&format!("bitcoinz:{}?amount=1&amount=2", T_ADDR)),
            Err(UriError::DuplicateParameter(name)) if name == "amount"
        );

        // memo associated with t-addr
        assert_matches!(
            PaymentRequest::from_uri(&format!("bitcoinz:{}?memo=hi", T_ADDR)),
            Err(UriError::TransparentMemo)
        );

        // unknown required parameter
        assert_matches!(
            PaymentRequest::from_uri(&format!("bitcoinz:{}?req-fee=1", T_ADDR)),
            Err(UriError::UnknownRequiredParameter(name)) if name == "req-fee"
        );

        // memo too long
        let long_memo = "a".repeat(513);
        assert_matches!(
            PaymentRequest::from_uri(&format!("bitcoinz:{}?memo={}", Z_ADDR, long_memo)),
            Err(UriError::MemoBytesError(_))
        );

        // negative amount
        assert!(PaymentRequest::from_uri(&format!("bitcoinz:{}?amount=-1", T_ADDR)).is_err());

        // bad amount format
        assert!(PaymentRequest::from_uri(&format!("bitcoinz:{}?amount=123.", T_ADDR)).is_err());

        // amount exceeds MAX_MONEY
        assert!(PaymentRequest::from_uri(&format!(
            "bitcoinz:{}?amount=21000000000.00000001",
            T_ADDR
        ))
        .is_err());

        // amount component exceeds a u64
        assert!(PaymentRequest::from_uri(&format!(
            "bitcoinz:{}?amount=18446744073709551624",
            T_ADDR
        ))
        .is_err());

        // unencoded space in a value
        assert!(PaymentRequest::from_uri(&format!("bitcoinz:{}?message=a b", T_ADDR)).is_err());
    }

    #[test]
    fn new_rejects_transparent_memo() {
        let memo: Memo = "hi".parse().unwrap();
        assert_matches!(
            PaymentRequest::new(T_ADDR, None, Some(memo)),
            Err(UriError::TransparentMemo)
        );
    }

    proptest! {
        #[test]
        fn prop_roundtrip_request(req in arb_payment_request()) {
            let parsed = PaymentRequest::from_uri(&req.to_uri()).unwrap();
            assert_eq!(parsed, req);
        }
    }
}
