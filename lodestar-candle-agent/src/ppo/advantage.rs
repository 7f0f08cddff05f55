//! Returns and advantages of on-policy trajectories.
use anyhow::Result;
use candle_core::Tensor;

/// Discounted reward sums and advantages `r_sum - mask * value`.
///
/// `mask[i]` is zero where an episode ends, so sums do not cross episode
/// boundaries. The recursion runs backward from the last transition and
/// restarts from zero wherever `is_last[i]` marks the end of a trajectory.
pub fn reward_sum_raw(
    reward: &[f32],
    mask: &[f32],
    is_last: &[bool],
    value: &[f32],
) -> (Vec<f32>, Vec<f32>) {
    let r_sum = discounted_sum(reward, mask, is_last);
    let adv = r_sum
        .iter()
        .zip(mask.iter().zip(value.iter()))
        .map(|(r, (m, v))| r - m * v)
        .collect();
    (r_sum, adv)
}

/// Discounted reward sums and generalized advantages.
///
/// Going backward, `adv[i] = reward[i] + mask[i] * (prev - value[i])` and
/// `prev = value[i] + adv[i] * lambda_gae`, starting from `prev = 0` at the
/// end of every trajectory.
pub fn reward_sum_gae(
    reward: &[f32],
    mask: &[f32],
    is_last: &[bool],
    value: &[f32],
    lambda_gae: f32,
) -> (Vec<f32>, Vec<f32>) {
    let r_sum = discounted_sum(reward, mask, is_last);
    let mut adv = vec![0f32; reward.len()];
    let mut pre_adv = 0f32;
    for i in (0..reward.len()).rev() {
        if is_last[i] {
            pre_adv = 0.0;
        }
        adv[i] = reward[i] + mask[i] * (pre_adv - value[i]);
        pre_adv = value[i] + adv[i] * lambda_gae;
    }
    (r_sum, adv)
}

fn discounted_sum(reward: &[f32], mask: &[f32], is_last: &[bool]) -> Vec<f32> {
    let mut r_sum = vec![0f32; reward.len()];
    let mut pre_r_sum = 0f32;
    for i in (0..reward.len()).rev() {
        if is_last[i] {
            pre_r_sum = 0.0;
        }
        r_sum[i] = reward[i] + mask[i] * pre_r_sum;
        pre_r_sum = r_sum[i];
    }
    r_sum
}

/// Shifts advantages to zero mean and scales them by `1 / (std + 1e-5)`,
/// with the sample standard deviation.
pub fn normalize_advantage(adv: &[f32]) -> Vec<f32> {
    let n = adv.len();
    if n == 0 {
        return vec![];
    }
    let mean = adv.iter().sum::<f32>() / n as f32;
    let var = match n {
        1 => 0.0,
        _ => adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1) as f32,
    };
    let std = var.sqrt();
    adv.iter().map(|a| (a - mean) / (std + 1e-5)).collect()
}

/// `-mean(min(ratio * adv, clip(ratio, 1 - ratio_clip, 1 + ratio_clip) * adv))`
/// with `ratio = exp(logp - old_logp)`.
pub fn clipped_surrogate(
    logp: &Tensor,
    old_logp: &Tensor,
    adv: &Tensor,
    ratio_clip: f64,
) -> Result<Tensor> {
    let ratio = (logp - old_logp.detach())?.exp()?;
    let surrogate1 = (adv * &ratio)?;
    let surrogate2 = (adv * ratio.clamp(1.0 - ratio_clip, 1.0 + ratio_clip)?)?;
    Ok((surrogate1.minimum(&surrogate2)?.mean_all()? * -1.0)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_reward_sum_raw() {
        let (r_sum, adv) = reward_sum_raw(&[1., 1., 1.], &[1., 1., 0.], &[false, false, true], &[0.5, 0.5, 0.5]);
        assert_close(&r_sum, &[3., 2., 1.]);
        assert_close(&adv, &[2.5, 1.5, 1.]);
    }

    #[test]
    fn test_reward_sum_gae_trace() {
        let (r_sum, adv) =
            reward_sum_gae(
            &[1., 1., 1.],
            &[0.9, 0.9, 0.],
            &[false, false, true],
            &[0.5, 0.5, 0.5],
            0.98,
        );
        assert_close(&r_sum, &[2.71, 1.9, 1.]);
        assert_close(&adv, &[2.659924, 1.882, 1.]);
    }

    #[test]
    fn test_sums_stop_at_episode_end() {
        let (r_sum, _) = reward_sum_raw(
            &[1., 2., 3., 4.],
            &[0.5, 0., 0.5, 0.],
            &[false, false, false, true],
            &[0.; 4],
        );
        assert_close(&r_sum, &[2., 2., 5., 4.]);
    }

    #[test]
    fn test_sums_stop_at_unfinished_trajectory_end() {
        // Two trajectories stored back to back, neither reaching an episode end
        let reward = [1., 2., 3., 4.];
        let mask = [0.5; 4];
        let is_last = [false, true, false, true];
        let (r_sum, adv) = reward_sum_raw(&reward, &mask, &is_last, &[0.; 4]);
        assert_close(&r_sum, &[2., 2., 5., 4.]);
        assert_close(&adv, &[2., 2., 5., 4.]);

        let (_, adv) = reward_sum_gae(&reward, &mask, &is_last, &[0.; 4], 1.0);
        assert_close(&adv, &[2., 2., 5., 4.]);
    }

    #[test]
    fn test_normalize_advantage() {
        let adv = normalize_advantage(&[1., 2., 3., 4.]);
        let mean = adv.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        // Sample std of [1, 2, 3, 4] is 1.2909944
        assert!((adv[3] - 1.5 / (1.290_994_4 + 1e-5)).abs() < 1e-4);
        assert_eq!(normalize_advantage(&[3.]), vec![0.]);
    }

    #[test]
    fn test_surrogate_at_zero_drift() -> Result<()> {
        let logp = Tensor::new(&[[-1.2f32], [-0.3], [-2.0]], &Device::Cpu)?;
        let adv = Tensor::new(&[[0.5f32], [-1.0], [2.0]], &Device::Cpu)?;
        let obj = clipped_surrogate(&logp, &logp, &adv, 0.2)?.to_scalar::<f32>()?;
        assert!((obj + 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_surrogate_clips_large_ratios() -> Result<()> {
        let old_logp = Tensor::new(&[[0f32]], &Device::Cpu)?;
        let logp = Tensor::new(&[[1f32]], &Device::Cpu)?;
        let adv = Tensor::new(&[[1f32]], &Device::Cpu)?;
        let obj = clipped_surrogate(&logp, &old_logp, &adv, 0.2)?.to_scalar::<f32>()?;
        assert!((obj + 1.2).abs() < 1e-6);
        Ok(())
    }
}
