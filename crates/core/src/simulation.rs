//! ERC-4337 validation error codes and the structured outcome of a simulation.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static AA_CODE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"AA\d{2}").ok());

/// A two digit `AAxx` code raised by the `EntryPoint` when validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AaCode(pub u8);

impl AaCode {
    /// `initCode` on an already deployed sender.
    pub const AA10: Self = Self(10);
    /// `initCode` failed or ran out of gas.
    pub const AA13: Self = Self(13);
    /// Prefund not paid.
    pub const AA21: Self = Self(21);
    /// Account validation reverted or ran out of gas.
    pub const AA23: Self = Self(23);
    /// Signature error.
    pub const AA24: Self = Self(24);
    /// Invalid account nonce.
    pub const AA25: Self = Self(25);
    /// Paymaster validity window expired or not yet due.
    pub const AA32: Self = Self(32);
    /// Paymaster validation ran out of gas.
    pub const AA33: Self = Self(33);
    /// Paymaster signature error.
    pub const AA34: Self = Self(34);
    /// Invalid beneficiary.
    pub const AA90: Self = Self(90);

    /// First `AAxx` occurrence in `text`.
    pub fn find_in(text: &str) -> Option<Self> {
        let re = AA_CODE_RE.as_ref()?;
        re.find(text).and_then(|m| m.as_str().parse().ok())
    }

    /// Canonical reason string used by the reference `EntryPoint`.
    pub const fn description(&self) -> &'static str {
        match self.0 {
            10 => "sender already constructed",
            13 => "initCode failed or OOG",
            14 => "initCode must return sender",
            15 => "initCode must create sender",
            20 => "account not deployed",
            21 => "didn't pay prefund",
            22 => "expired or not due",
            23 => "reverted (or OOG)",
            24 => "signature error",
            25 => "invalid account nonce",
            26 => "over verificationGasLimit",
            30 => "paymaster not deployed",
            31 => "paymaster deposit too low",
            32 => "paymaster expired or not due",
            33 => "reverted (or OOG)",
            34 => "signature error",
            36 => "over paymasterVerificationGasLimit",
            40 => "over verificationGasLimit",
            41 => "too little verificationGas",
            50 => "postOp reverted",
            51 => "prefund below actualGasCost",
            90 => "invalid beneficiary",
            91 => "failed send to beneficiary",
            92 => "internal call only",
            93 => "invalid paymasterAndData",
            94 => "invalid data",
            95 => "out of gas",
            96 => "invalid aggregator",
            _ => "unknown validation error",
        }
    }
}

impl fmt::Display for AaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AA{:02}", self.0)
    }
}

impl FromStr for AaCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("AA")
            .filter(|digits| digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .map(Self)
            .ok_or_else(|| format!("not an AA code: {s:?}"))
    }
}

impl Serialize for AaCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AaCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of a pre-flight simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Whether the simulated bundle went through.
    pub success: bool,
    /// First AA code found in the trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<AaCode>,
    /// Free text revert reason, set when no AA code could be extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Raw simulator response, kept for diagnostics.
    pub raw: serde_json::Value,
}

impl SimulationResult {
    /// A successful result carrying `raw`.
    pub fn success(raw: serde_json::Value) -> Self {
        Self { success: true, code: None, reason: None, raw }
    }

    /// A failed simulation. The AA code is looked up in `message`; when there is none the
    /// message is kept as the reason.
    pub fn failure(message: Option<&str>, raw: serde_json::Value) -> Self {
        let message = message.map(strip_nul).filter(|m| !m.is_empty());
        let code = message.as_deref().and_then(AaCode::find_in);
        let reason = if code.is_some() { None } else { message };
        Self { success: false, code, reason, raw }
    }

    /// Best effort human text for the failure.
    pub fn describe(&self) -> String {
        match (&self.code, &self.reason) {
            _ if self.success => "success".to_string(),
            (Some(code), _) => format!("{code} {}", code.description()),
            (None, Some(reason)) => reason.clone(),
            (None, None) => "reverted without reason".to_string(),
        }
    }
}

/// Removes the NUL padding ABI-decoded revert strings tend to carry.
pub fn strip_nul(message: &str) -> String {
    message.chars().filter(|c| *c != '\0').collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_code_inside_revert_message() {
        assert_eq!(
            AaCode::find_in("FailedOp(0, \"AA23 reverted (or OOG)\")"),
            Some(AaCode::AA23)
        );
        assert_eq!(AaCode::find_in("execution reverted"), None);
        assert_eq!(AaCode::find_in("AA9"), None);
    }

    #[test]
    fn displays_and_parses() {
        assert_eq!(AaCode::AA10.to_string(), "AA10");
        assert_eq!("AA90".parse::<AaCode>(), Ok(AaCode::AA90));
        assert!("AA1".parse::<AaCode>().is_err());
        assert!("BB10".parse::<AaCode>().is_err());
        assert_eq!(serde_json::to_value(AaCode::AA25).unwrap(), "AA25");
        assert_eq!(AaCode::AA25.description(), "invalid account nonce");
    }

    #[test]
    fn failure_prefers_code_over_reason() {
        let with_code = SimulationResult::failure(
            Some("\0\0FailedOp(0,\"AA24 signature error\")\0"),
            serde_json::Value::Null,
        );
        assert_eq!(with_code.code, Some(AaCode::AA24));
        assert_eq!(with_code.reason, None);
        assert_eq!(with_code.describe(), "AA24 signature error");

        let without = SimulationResult::failure(
            Some("ERC20: insufficient\0\0 allowance\0"),
            serde_json::Value::Null,
        );
        assert_eq!(without.code, None);
        assert_eq!(without.reason.as_deref(), Some("ERC20: insufficient allowance"));
    }

    #[test]
    fn success_has_no_code() {
        let ok = SimulationResult::success(serde_json::json!({"status": true}));
        assert!(ok.success);
        assert_eq!(ok.describe(), "success");
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("code").is_none());
    }
}
