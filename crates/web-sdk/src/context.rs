//! Shared attribution context — the affiliate ref and click id the public
//! API reports against, plus the affiliate id published to integrations.

use std::sync::Arc;

use parking_lot::RwLock;

use pushlap_core::types::ReferralState;

#[derive(Debug, Default)]
struct ContextInner {
    referral: ReferralState,
    pickaxe_affiliate_id: Option<String>,
}

/// Cheaply cloneable handle; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct AffiliateContext {
    inner: Arc<RwLock<ContextInner>>,
}

impl AffiliateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn affiliate_ref(&self) -> Option<String> {
        self.inner.read().referral.affiliate_ref.clone()
    }

    /// Confirmed click id, or the ref while registration is pending.
    pub fn click_id(&self) -> Option<String> {
        self.inner.read().referral.click_id.clone()
    }

    pub fn referral(&self) -> ReferralState {
        self.inner.read().referral.clone()
    }

    /// Set the ref and use it as the provisional click id.
    pub fn set_provisional(&self, affiliate_ref: &str) {
        let mut inner = self.inner.write();
        inner.referral.affiliate_ref = Some(affiliate_ref.to_string());
        inner.referral.click_id = Some(affiliate_ref.to_string());
    }

    pub fn set_click_id(&self, click_id: &str) {
        self.inner.write().referral.click_id = Some(click_id.to_string());
    }

    /// Forget the referral. The Pickaxe id is left as published.
    pub fn clear(&self) {
        self.inner.write().referral = ReferralState::default();
    }

    /// Affiliate id handed to the Pickaxe Studio embed config.
    pub fn pickaxe_affiliate_id(&self) -> Option<String> {
        self.inner.read().pickaxe_affiliate_id.clone()
    }

    pub fn publish_pickaxe(&self, affiliate_id: &str) {
        self.inner.write().pickaxe_affiliate_id = Some(affiliate_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_then_confirmed() {
        let ctx = AffiliateContext::new();
        assert_eq!(ctx.affiliate_ref(), None);

        ctx.set_provisional("alice");
        assert_eq!(ctx.click_id(), Some("alice".into()));

        let shared = ctx.clone();
        shared.set_click_id("c-1");
        assert_eq!(ctx.click_id(), Some("c-1".into()));
        assert!(ctx.referral().is_attributed());

        ctx.publish_pickaxe("c-1");
        ctx.clear();
        assert_eq!(ctx.referral(), ReferralState::default());
        assert_eq!(ctx.pickaxe_affiliate_id(), Some("c-1".into()));
    }
}
