// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaigns: a batch of targets sharing a content category and a window.

use chrono::{DateTime, Utc};

use courier_core::{ContentCategory, Target};

use crate::priority::TargetPriorityScorer;
use crate::queue::ScheduleCandidate;

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: String,
    pub category: ContentCategory,
    pub targets: Vec<Target>,
    pub starts_at: DateTime<Utc>,
    /// Candidates not sent by this instant are dropped.
    pub ends_at: Option<DateTime<Utc>>,
}

pub struct CampaignPlanner {
    scorer: TargetPriorityScorer,
}

impl CampaignPlanner {
    pub fn new(scorer: TargetPriorityScorer) -> Self {
        Self { scorer }
    }

    /// Expand `campaign` into candidates, highest priority first.
    ///
    /// Returns nothing for a campaign that already ended. Replies need a
    /// user who addressed the agent, so reply campaigns plan nothing.
    pub fn plan(&self, campaign: &Campaign, now: DateTime<Utc>) -> Vec<ScheduleCandidate> {
        if campaign.ends_at.is_some_and(|end| end <= now) {
            return Vec::new();
        }
        let eligible_at = campaign.starts_at.max(now);

        let mut candidates: Vec<ScheduleCandidate> = campaign
            .targets
            .iter()
            .filter_map(|target| {
                let priority = self.scorer.priority(target);
                let mut candidate = match (campaign.category, target.is_group()) {
                    (ContentCategory::Broadcast, true) => {
                        ScheduleCandidate::broadcast(target.clone(), priority, eligible_at)
                    }
                    (ContentCategory::Direct, false) => {
                        ScheduleCandidate::direct(target.clone(), None, priority, eligible_at)
                    }
                    _ => return None,
                };
                candidate.campaign_id = Some(campaign.id.clone());
                candidate.expires_at = campaign.ends_at;
                Some(candidate)
            })
            .collect();

        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        candidates
    }
}
