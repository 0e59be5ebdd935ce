// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store key layout.
//!
//! Keys are deterministic composites of agent, target and scope so every
//! scheduler process sharing a store addresses the same entries.

use courier_core::{AgentId, TargetId};

/// Context segment used for per-recipient keys outside any group.
pub const DIRECT_CONTEXT: &str = "direct";

pub const SPAM_PREFIX: &str = "spam:";
pub const CONTACT_PREFIX: &str = "contact:";

pub fn agent_record(agent: &AgentId) -> String {
    format!("{SPAM_PREFIX}{agent}")
}

pub fn blackout(agent: &AgentId) -> String {
    format!("blackout:{agent}")
}

pub fn rate_window(agent: &AgentId) -> String {
    format!("cd:rate:{agent}")
}

pub fn per_recipient(agent: &AgentId, group: Option<&TargetId>, user: &TargetId) -> String {
    let context = group.map_or(DIRECT_CONTEXT, TargetId::as_str);
    format!("cd:rcpt:{agent}:{context}:{user}")
}

/// Prefix covering every per-recipient entry of `agent` inside `group`.
pub fn per_recipient_group_prefix(agent: &AgentId, group: &TargetId) -> String {
    format!("cd:rcpt:{agent}:{group}:")
}

pub fn per_group(agent: &AgentId, group: &TargetId) -> String {
    format!("cd:grp:{agent}:{group}")
}

pub fn group_global(group: &TargetId) -> String {
    format!("cd:glob:{group}")
}

pub fn contact(agent: &AgentId, user: &TargetId) -> String {
    format!("{CONTACT_PREFIX}{agent}:{user}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_keys_separate_group_and_direct_context() {
        let agent = AgentId::from("a1");
        let user = TargetId::from("u1");
        let group = TargetId::from("g1");
        assert_eq!(per_recipient(&agent, Some(&group), &user), "cd:rcpt:a1:g1:u1");
        assert_eq!(per_recipient(&agent, None, &user), "cd:rcpt:a1:direct:u1");
        assert!(per_recipient(&agent, Some(&group), &user)
            .starts_with(&per_recipient_group_prefix(&agent, &group)));
    }

    #[test]
    fn global_key_ignores_agent() {
        assert_eq!(group_global(&TargetId::from("g1")), "cd:glob:g1");
    }
}
