//! ERC-7677 paymaster payloads.

use alloy_primitives::{Address, B256, Bytes, Selector, U256};
use serde::{Deserialize, Serialize};

use crate::user_operation::UserOperationDraft;

/// Opaque context forwarded unchanged on both the stub and the final paymaster call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterContext {
    /// Contract the sponsored call targets.
    pub target: Address,
    /// Function being sponsored.
    pub selector: Selector,
    /// Positional call arguments, when the policy inspects them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<serde_json::Value>>,
    /// Requested end of the sponsorship window, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
    /// Requested start of the sponsorship window, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_after: Option<u64>,
    /// Hash of the operation being sponsored, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_op_hash: Option<B256>,
}

impl PaymasterContext {
    /// Context for `selector` on `target` with no window or arguments.
    pub const fn new(target: Address, selector: Selector) -> Self {
        Self {
            target,
            selector,
            args: None,
            valid_until: None,
            valid_after: None,
            user_op_hash: None,
        }
    }

    /// Restricts sponsorship to `[valid_after, valid_until]`, unix seconds.
    pub const fn with_validity(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.valid_after = Some(valid_after);
        self.valid_until = Some(valid_until);
        self
    }
}

/// The paymaster fields of a v0.7+ user operation as returned by a paymaster service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterFields {
    /// Paymaster contract.
    pub paymaster: Address,
    /// Opaque data checked by the paymaster contract.
    #[serde(default)]
    pub paymaster_data: Bytes,
    /// Gas for paymaster validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas for `postOp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl PaymasterFields {
    /// Writes the fields into `draft`. Gas limits absent from the response keep their
    /// current value so stub limits survive a final response that omits them.
    pub fn apply_to(&self, draft: &mut UserOperationDraft) {
        draft.paymaster = Some(self.paymaster);
        draft.paymaster_data = Some(self.paymaster_data.clone());
        if self.paymaster_verification_gas_limit.is_some() {
            draft.paymaster_verification_gas_limit = self.paymaster_verification_gas_limit;
        }
        if self.paymaster_post_op_gas_limit.is_some() {
            draft.paymaster_post_op_gas_limit = self.paymaster_post_op_gas_limit;
        }
    }
}

/// Display metadata a paymaster may attach to its stub response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorInfo {
    /// Sponsor display name.
    pub name: String,
    /// Icon URL or data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// `pm_getPaymasterStubData` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterStubData {
    /// Stub paymaster fields, good for estimation only.
    #[serde(flatten)]
    pub fields: PaymasterFields,
    /// When set, the stub is already final and `pm_getPaymasterData` can be skipped.
    #[serde(default)]
    pub is_final: bool,
    /// Who is sponsoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<SponsorInfo>,
}

/// `pm_getPaymasterData` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterData {
    /// Final paymaster fields to sign over.
    #[serde(flatten)]
    pub fields: PaymasterFields,
}
