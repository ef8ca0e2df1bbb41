//! Terminal output for the mobhunt binary.

use console::style;

use crate::config::HuntConfig;
use crate::detection::ObjectClass;
use crate::stats::StatsSnapshot;

const BANNER_TEXT: &str = r#"
  __  __       _     _   _             _
 |  \/  | ___ | |__ | | | |_   _ _ __ | |_
 | |\/| |/ _ \| '_ \| |_| | | | | '_ \| __|
 | |  | | (_) | |_) |  _  | |_| | | | | |_
 |_|  |_|\___/|_.__/|_| |_|\__,_|_| |_|\__|
"#;

pub fn print_banner() {
    println!("{}", style(BANNER_TEXT).cyan().bold());
    println!(
        "{}",
        style(format!("          perceive - decide - act    v{}", env!("CARGO_PKG_VERSION"))).dim()
    );
    println!();
}

pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").cyan(), msg);
}

pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

fn rule() {
    println!(
        "{}",
        style("════════════════════════════════════════════════════════════").dim()
    );
}

fn class_list(classes: &[ObjectClass]) -> String {
    classes
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

fn on_off(value: bool) -> String {
    if value {
        style("on").green().to_string()
    } else {
        style("off").dim().to_string()
    }
}

/// Human summary of the effective configuration.
pub fn print_config(config: &HuntConfig) {
    let a = &config.automation;
    let c = &config.controls;
    let m = &config.mob_hunting;
    let s = &config.safety;

    rule();
    println!("{}", style("TARGETING").cyan().bold());
    println!("  Priorities:      {}", class_list(&a.priority_targets));
    println!("  Confidence:      >= {:.2}", a.confidence_threshold);
    println!("  Max distance:    {:.0}px", a.max_detection_distance);
    match a.player_anchor {
        Some(p) => println!("  Anchor:          ({:.0}, {:.0})", p.x, p.y),
        None => println!("  Anchor:          frame centre"),
    }
    println!(
        "  Pacing:          scan {}ms, action delay {}ms",
        a.scan_interval_ms, a.action_delay_ms
    );

    println!("{}", style("CONTROLS").cyan().bold());
    println!("  Attack:          {:?} (key {})", c.attack_method, c.attack_key);
    println!("  Pickup:          {}", c.pickup_key);
    println!("  Interact:        {} ({}ms)", c.interact_key, c.interact_delay_ms);
    println!(
        "  Movement:        left={} right={} jump={} down={}",
        c.movement_keys.left, c.movement_keys.right, c.movement_keys.jump, c.movement_keys.down
    );

    println!("{}", style("MOB HUNTING").cyan().bold());
    println!("  Enabled:         {}", on_off(m.enable));
    println!("  Pattern:         {:?}", m.search_pattern);
    println!(
        "  Timing:          start after {:.1}s, search {:.1}s, return {}",
        m.search_delay_seconds,
        m.max_search_time_seconds,
        on_off(m.return_to_center)
    );

    println!("{}", style("SAFETY").cyan().bold());
    println!("  Failsafe:        {} ({:?})", on_off(s.enable_failsafe), s.failsafe_corner);
    match s.max_runtime() {
        Some(_) => println!("  Max runtime:     {}h", s.max_runtime_hours),
        None => println!("  Max runtime:     unlimited"),
    }
    rule();
}

/// End-of-session summary.
pub fn print_summary(snapshot: &StatsSnapshot) {
    rule();
    println!("{}", style("SESSION SUMMARY").cyan().bold());
    println!("  Session:         {}", snapshot.session_id);
    println!("  Runtime:         {:.1}s", snapshot.elapsed_secs);
    println!("  Cycles:          {} ({:.1} fps)", snapshot.cycles, snapshot.fps);
    println!("  Detections:      {}", snapshot.detections_seen);
    for (subject, count) in &snapshot.dispatched {
        println!("  {:<16} {}", format!("{}:", subject), count);
    }
    println!(
        "  Suppressed:      cooldown {}, safety {}, fault {}",
        snapshot.suppressed_by_cooldown, snapshot.suppressed_by_safety, snapshot.suppressed_by_fault
    );
    println!(
        "  Searches:        {} ({:.1}s total)",
        snapshot.searches_started, snapshot.search_secs_total
    );
    rule();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_list() {
        assert_eq!(
            class_list(&[ObjectClass::Item, ObjectClass::Mob, ObjectClass::Npc]),
            "item > mob > npc"
        );
    }
}
