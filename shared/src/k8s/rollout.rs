//! Resolves `IntOrString` rollout-budget fields (`maxUnavailable`,
//! `maxSurge`) against a total, using the same rounding rules Kubernetes
//! Deployments use: `maxUnavailable` rounds down, `maxSurge` rounds up.
//! Neither field may resolve below zero.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

fn percent_of(total: i32, percent: &str) -> Option<i32> {
    let percent = percent.strip_suffix('%')?;
    let percent: f64 = percent.parse().ok()?;
    Some(((total as f64) * percent / 100.0) as i32)
}

fn resolve(total: i32, value: &IntOrString, round_up: bool) -> i32 {
    let raw = match value {
        IntOrString::Int(i) => *i,
        IntOrString::String(s) => match percent_of(total, s) {
            Some(p) if round_up => {
                let exact = (total as f64) * s.trim_end_matches('%').parse::<f64>().unwrap_or(0.0) / 100.0;
                if exact > p as f64 {
                    p + 1
                } else {
                    p
                }
            }
            Some(p) => p,
            None => 0,
        },
    };
    raw.max(0)
}

/// `maxUnavailable`, rounded down, never negative.
pub fn max_unavailable(total: i32, value: &IntOrString) -> i32 {
    resolve(total, value, false)
}

/// `maxSurge`, rounded up, never negative.
pub fn max_surge(total: i32, value: &IntOrString) -> i32 {
    resolve(total, value, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_int() {
        assert_eq!(max_unavailable(4, &IntOrString::Int(1)), 1);
        assert_eq!(max_surge(4, &IntOrString::Int(0)), 0);
    }

    #[test]
    fn resolves_percent_rounding() {
        // 25% of 4 = 1 exactly either way.
        assert_eq!(max_unavailable(4, &IntOrString::String("25%".into())), 1);
        assert_eq!(max_surge(4, &IntOrString::String("25%".into())), 1);
        // 10% of 4 = 0.4: unavailable rounds down to 0, surge rounds up to 1.
        assert_eq!(max_unavailable(4, &IntOrString::String("10%".into())), 0);
        assert_eq!(max_surge(4, &IntOrString::String("10%".into())), 1);
    }
}
