//! [`AutoSort`] – keeps running pick-and-place cycles until the table is
//! clear.
//!
//! Colors are visited in configured order. A successful cycle retries the
//! same color straight away; "not found" or an aborted cycle moves on to the
//! next one. The session ends when:
//!
//! - a full pass over every color sorts nothing,
//! - the cancel flag is raised (checked between cycles, never mid-motion),
//! - `autosort.max_cycles` attempts have been made,
//! - the same color succeeds `autosort.repeat_pick_limit` times in a row.
//!
//! Fatal link errors end the session immediately and are returned as is.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use chroma_types::{AutoSortConfig, RobotError, SortReport, StopReason};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::loop_guard::LoopGuard;
use crate::pick_place::PickAndPlace;

pub struct AutoSort {
    colors: Vec<String>,
    settings: AutoSortConfig,
    cancel: Arc<AtomicBool>,
}

impl AutoSort {
    pub fn new(colors: Vec<String>, settings: AutoSortConfig) -> Self {
        Self {
            colors,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sort order and limits taken from the controller's configuration.
    pub fn for_robot(robot: &PickAndPlace) -> Self {
        let cfg = robot.config();
        Self::new(cfg.sort_order(), cfg.autosort)
    }

    /// Share an existing flag, e.g. one raised by a Ctrl-C handler.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the session before its next cycle when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the session to completion.
    ///
    /// The returned report's `total_sorted` is the number of successful
    /// cycles.
    ///
    /// # Errors
    ///
    /// Whatever [`PickAndPlace::run_cycle`] propagates.
    #[instrument(name = "autosort", skip_all, fields(colors = self.colors.len()))]
    pub fn run(&self, robot: &mut PickAndPlace) -> Result<SortReport, RobotError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut guard = self.settings.repeat_pick_limit.map(LoopGuard::new);
        let mut attempts = 0usize;
        let mut total_sorted = 0usize;
        let mut index = 0usize;
        let mut sorted_this_pass = 0usize;

        info!(%run_id, "auto-sort started");
        let stop_reason = loop {
            if self.colors.is_empty() {
                break StopReason::Exhausted;
            }
            if self.cancel.load(Ordering::SeqCst) {
                info!("auto-sort cancelled");
                break StopReason::Cancelled;
            }
            if self.settings.max_cycles.is_some_and(|cap| attempts >= cap) {
                warn!(attempts, "cycle cap reached");
                break StopReason::CycleCap;
            }

            let color = &self.colors[index];
            let result = robot.run_cycle(color)?;
            attempts += 1;

            if result.success {
                total_sorted += 1;
                sorted_this_pass += 1;
                info!(color = %color, total_sorted, "cycle sorted");
                if guard.as_mut().is_some_and(|g| g.record(color)) {
                    warn!(color = %color, "same color picked too many times in a row");
                    break StopReason::RepeatedPick {
                        color: color.clone(),
                    };
                }
                continue;
            }

            if let Some(g) = guard.as_mut() {
                g.reset();
            }
            index += 1;
            if index == self.colors.len() {
                if sorted_this_pass == 0 {
                    break StopReason::Exhausted;
                }
                index = 0;
                sorted_this_pass = 0;
            }
        };

        info!(%run_id, attempts, total_sorted, ?stop_reason, "auto-sort finished");
        Ok(SortReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            attempts,
            total_sorted,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_hal::{SceneObject, SimArm, SimExecutor};
    use chroma_kernel::MotionGate;
    use chroma_perception::{Blob, CandidatePipeline, ColorThresholdSegmenter, ScriptedSegmenter};
    use chroma_types::RobotConfig;

    fn on_target() -> Vec<Blob> {
        vec![Blob::new(320.0, 360.0, 600)]
    }

    fn scripted(cfg: RobotConfig) -> (PickAndPlace, ScriptedSegmenter) {
        let sim = SimExecutor::from_config(&cfg);
        let script = ScriptedSegmenter::new();
        let gate = MotionGate::from_config(Box::new(sim), &cfg);
        let pipeline = CandidatePipeline::from_config(Box::new(script.clone()), &cfg);
        (PickAndPlace::new(gate, pipeline, cfg), script)
    }

    /// One search hit plus one servo frame per success.
    fn script_successes(script: &ScriptedSegmenter, color: &str, n: usize) {
        for _ in 0..n {
            script.push(color, on_target());
            script.push(color, on_target());
        }
    }

    #[test]
    fn one_success_per_color_takes_three_attempts_each() {
        let (mut robot, script) = scripted(RobotConfig::default());
        for color in ["red", "green", "blue"] {
            script_successes(&script, color, 1);
        }

        let report = AutoSort::for_robot(&robot).run(&mut robot).unwrap();

        // Pass 1: success + not found per color; pass 2: three misses.
        assert_eq!(report.attempts, 9);
        assert_eq!(report.total_sorted, 3);
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn empty_table_stops_after_one_pass() {
        let (mut robot, script) = scripted(RobotConfig::default());
        let report = AutoSort::for_robot(&robot).run(&mut robot).unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.total_sorted, 0);
        // Nine search stops per color.
        assert_eq!(script.total_calls(), 27);
    }

    #[test]
    fn cancel_before_start_runs_nothing() {
        let (mut robot, script) = scripted(RobotConfig::default());
        script_successes(&script, "red", 1);
        let sort = AutoSort::for_robot(&robot);
        sort.cancel_flag().store(true, Ordering::SeqCst);

        let report = sort.run(&mut robot).unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.attempts, 0);
        assert_eq!(script.total_calls(), 0);
    }

    #[test]
    fn cycle_cap_bounds_the_session() {
        let mut cfg = RobotConfig::default();
        cfg.autosort.max_cycles = Some(2);
        let (mut robot, script) = scripted(cfg);
        script.repeat("red", on_target());

        let report = AutoSort::for_robot(&robot).run(&mut robot).unwrap();

        assert_eq!(report.stop_reason, StopReason::CycleCap);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.total_sorted, 2);
    }

    #[test]
    fn phantom_object_trips_the_repeat_guard() {
        let mut cfg = RobotConfig::default();
        cfg.autosort.repeat_pick_limit = Some(3);
        let (mut robot, script) = scripted(cfg);
        script.repeat("green", on_target());

        let report = AutoSort::for_robot(&robot).run(&mut robot).unwrap();

        assert_eq!(
            report.stop_reason,
            StopReason::RepeatedPick {
                color: "green".into()
            }
        );
        // Red found nothing first.
        assert_eq!(report.attempts, 4);
        assert_eq!(report.total_sorted, 3);
    }

    #[test]
    fn no_colors_is_exhausted_immediately() {
        let (mut robot, _script) = scripted(RobotConfig::default());
        let report = AutoSort::new(Vec::new(), AutoSortConfig::default())
            .run(&mut robot)
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(report.attempts, 0);
    }

    #[test]
    fn link_loss_ends_the_session_with_an_error() {
        let cfg = RobotConfig::default();
        let sim = SimExecutor::from_config(&cfg);
        sim.disconnect_at(0);
        let gate = MotionGate::from_config(Box::new(sim), &cfg);
        let pipeline =
            CandidatePipeline::from_config(Box::new(ScriptedSegmenter::new()), &cfg);
        let mut robot = PickAndPlace::new(gate, pipeline, cfg);

        let err = AutoSort::for_robot(&robot).run(&mut robot).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn simulated_table_is_sorted_end_to_end() {
        let mut cfg = RobotConfig::default();
        cfg.servo.tolerance_x_px = 10.0;
        cfg.servo.tolerance_y_px = 10.0;
        let arm = SimArm::from_config(&cfg)
            .with_object(SceneObject::new("red", 2.0, 2.5))
            .with_object(SceneObject::new("green", 4.0, 4.5));
        let sim = SimExecutor::new(arm);
        let gate = MotionGate::from_config(Box::new(sim.clone()), &cfg);
        let pipeline = CandidatePipeline::from_config(
            Box::new(ColorThresholdSegmenter::from_config(&cfg)),
            &cfg,
        );
        let mut robot = PickAndPlace::new(gate, pipeline, cfg.clone());

        let report = AutoSort::for_robot(&robot).run(&mut robot).unwrap();

        assert_eq!(report.total_sorted, 2);
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        sim.with_backend(|arm| {
            assert!(arm.held().is_none());
            for object in arm.objects() {
                let zone = cfg.drop_zone(&object.color).unwrap();
                assert!(
                    zone.contains_xy(object.x, object.y),
                    "{} object left at ({}, {})",
                    object.color,
                    object.x,
                    object.y
                );
            }
        });
    }
}
