/// 分歧度：检测分数的总体标准差（除数为 N）
///
/// 少于两个观测值时无法衡量分歧，返回 0。
pub fn standard_deviation(scores: &[f64]) -> f64 {
    // 完全一致时精确为 0，不受均值舍入影响
    if scores.len() < 2 || scores.iter().all(|s| *s == scores[0]) {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let squared = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    squared.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fewer_than_two_scores_have_no_spread() {
        assert_eq!(standard_deviation(&[]), 0.0);
        assert_eq!(standard_deviation(&[73.0]), 0.0);
    }

    #[test]
    fn uses_population_divisor() {
        // mean 11, deviations (1, 1, 0) → sqrt(2/3)
        let sd = standard_deviation(&[10.0, 12.0, 11.0]);
        assert!((sd - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((standard_deviation(&[90.0, 10.0]) - 40.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn spread_is_non_negative(scores in prop::collection::vec(0.0f64..=100.0, 0..12)) {
            prop_assert!(standard_deviation(&scores) >= 0.0);
        }

        #[test]
        fn equal_scores_have_zero_spread(score in 0.0f64..=100.0, n in 1usize..10) {
            prop_assert_eq!(standard_deviation(&vec![score; n]), 0.0);
        }

        #[test]
        fn distinct_scores_have_positive_spread(
            a in 0.0f64..=100.0,
            delta in 0.5f64..=50.0,
        ) {
            let b = if a + delta <= 100.0 { a + delta } else { a - delta };
            prop_assert!(standard_deviation(&[a, b]) > 0.0);
        }
    }
}
