//! Scroll-to-saturation loading of the results panel.
//!
//! The result list is lazily loaded: more anchors mount only while the panel is
//! scrolled. The loader keeps scrolling until enough anchors are mounted, the
//! list stops growing, or the iteration cap is hit.

use crate::acquisition::policy::ScrollPolicy;
use crate::scraping::browser::BrowserPage;
use crate::scraping::locators::Locator;
use rand::distr::{Distribution, Uniform};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ScrollLoader {
    policy: ScrollPolicy,
    anchor: Locator,
}

impl ScrollLoader {
    pub fn new(policy: ScrollPolicy, anchor: Locator) -> Self {
        Self { policy, anchor }
    }

    /// Scroll until at least `candidate_target(min_target)` anchors are mounted
    /// or loading is exhausted. Returns the last observed anchor count.
    pub async fn load_candidates(
        &self,
        page: &dyn BrowserPage,
        min_target: usize,
        cancel: &CancellationToken,
    ) -> usize {
        let p = &self.policy;
        let target = p.candidate_target(min_target);
        let mut previous = 0usize;
        let mut found = 0usize;
        let mut no_change = 0u32;

        for iteration in 1..=p.max_iterations {
            if cancel.is_cancelled() {
                info!("Scroll loading cancelled at {} candidates", found);
                return found;
            }

            if let Err(e) = page.scroll_by(0, p.scroll_delta).await {
                warn!("Scroll failed: {}", e);
            }
            page.wait(p.settle_ms).await;

            found = match page.count_matches(&self.anchor).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Counting candidates failed: {}", e);
                    previous
                }
            };
            info!("Currently found: {} (target: {})", found, target);

            if found >= target {
                info!("Reached target of {} candidates", target);
                return found;
            }

            if found == previous {
                no_change += 1;
                debug!("No new candidates, attempt {}/{}", no_change, p.max_no_change);
                if no_change >= p.max_no_change {
                    info!("List stopped growing at {} candidates", found);
                    return found;
                }
                self.perturb(page).await;
            } else {
                no_change = 0;
            }
            previous = found;

            if p.jitter.enabled {
                let (delta, wait_ms) = self.sample_jitter();
                if let Err(e) = page.scroll_by(0, delta).await {
                    warn!("Jitter scroll failed: {}", e);
                }
                page.wait(wait_ms).await;
            }

            if iteration == p.max_iterations {
                warn!("Scroll loading stopped after {} iterations", iteration);
            }
        }

        found
    }

    /// Overshoot then scroll back a little, which re-triggers a stalled lazy loader.
    async fn perturb(&self, page: &dyn BrowserPage) {
        let p = &self.policy;
        if let Err(e) = page.scroll_by(0, p.perturb_forward).await {
            warn!("Perturbation scroll failed: {}", e);
        }
        page.wait(p.perturb_forward_wait_ms).await;
        if let Err(e) = page.scroll_by(0, -p.perturb_back).await {
            warn!("Perturbation scroll failed: {}", e);
        }
        page.wait(p.perturb_back_wait_ms).await;
    }

    fn sample_jitter(&self) -> (i64, u64) {
        let j = &self.policy.jitter;
        let mut rng = rand::rng();
        let delta = Uniform::new_inclusive(j.min_delta, j.max_delta)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(j.min_delta);
        let wait_ms = Uniform::new_inclusive(j.min_wait_ms, j.max_wait_ms)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(j.min_wait_ms);
        (delta, wait_ms)
    }
}
