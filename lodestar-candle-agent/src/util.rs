//! Utilities.
mod ou_noise;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
pub use ou_noise::OrnsteinUhlenbeckNoise;

/// `ln(sqrt(2 * pi))`.
pub const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Range the log standard deviation of squashed Gaussian policies is clamped into.
pub const LOG_STD_RANGE: (f64, f64) = (-20.0, 2.0);

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    let dest = dest.data().lock().unwrap();
    let src = src.data().lock().unwrap();

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .ok_or_else(|| anyhow::anyhow!("Variable {} not found in the source", k))?;
        let t_dest = ((tau * v_src.as_tensor())? + ((1.0 - tau) * v_dest.as_tensor())?)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Elementwise smooth L1 (Huber) loss.
///
/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = (x - y)?.abs()?;
    let quad = (d.sqr()? * 0.5)?;
    let lin = (&d - 0.5)?;
    Ok(d.lt(1.0)?.where_cond(&quad, &lin)?)
}

/// Mean of the smooth L1 loss.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    Ok(smooth_l1(x, y)?.mean_all()?)
}

/// Smooth L1 loss, optionally weighted per sample before averaging.
///
/// `weight` has the same shape as `x`. All weights equal to one give
/// [`smooth_l1_loss`].
pub fn weighted_smooth_l1_loss(x: &Tensor, y: &Tensor, weight: Option<&Tensor>) -> Result<Tensor> {
    match weight {
        None => smooth_l1_loss(x, y),
        Some(w) => Ok(smooth_l1(x, y)?.broadcast_mul(w)?.mean_all()?),
    }
}

/// Returns the sample standard deviation of all elements, `0` for fewer than two.
pub fn std(t: &Tensor) -> Result<f32> {
    let n = t.elem_count();
    if n < 2 {
        return Ok(0.0);
    }
    let t = t.to_dtype(DType::F32)?;
    let d = t.broadcast_sub(&t.mean_all()?)?;
    let var = (d.sqr()?.sum_all()? / (n - 1) as f64)?;
    Ok(var.sqrt()?.to_scalar::<f32>()?)
}

/// Creates a `[rows, data.len() / rows]` tensor from row-major data.
pub fn rows_to_tensor(data: &[f32], rows: usize, device: &Device) -> Result<Tensor> {
    let cols = if rows == 0 { 0 } else { data.len() / rows };
    Ok(Tensor::from_slice(data, (rows, cols), device)?)
}

/// Creates a `[data.len(), 1]` tensor.
pub fn column_tensor(data: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(data, (data.len(), 1), device)?)
}

/// Adds Gaussian noise of standard deviation `std`, clipped to
/// `[-noise_clip, noise_clip]`, to actions and clips the result to `[-1, 1]`.
pub fn add_clipped_noise(act: &Tensor, std: f64, noise_clip: f64) -> Result<Tensor> {
    let noise = act.randn_like(0.0, std)?.clamp(-noise_clip, noise_clip)?;
    Ok((act + noise)?.clamp(-1.0, 1.0)?)
}

/// Log-density of a diagonal Gaussian given the standardized noise.
///
/// Returns `sum(-noise^2 / 2 - log_std - ln(sqrt(2 pi)))` over the last
/// dimension, of shape `[batch, 1]`. `log_std` broadcasts to `noise`.
pub fn gaussian_log_prob(noise: &Tensor, log_std: &Tensor) -> Result<Tensor> {
    let logp = ((noise.sqr()? * -0.5)?.broadcast_sub(log_std)? - LOG_SQRT_2PI)?;
    Ok(logp.sum_keepdim(1)?)
}

/// Samples a tanh-squashed Gaussian action and its log-probability.
///
/// `log_std` is clamped to `[min_log_std, max_log_std]`. The log-probability
/// includes the change of variables of tanh and has shape `[batch, 1]`.
pub fn tanh_gaussian_sample(
    mean: &Tensor,
    log_std: &Tensor,
    (min_log_std, max_log_std): (f64, f64),
) -> Result<(Tensor, Tensor)> {
    let log_std = log_std.clamp(min_log_std, max_log_std)?;
    let noise = mean.randn_like(0.0, 1.0)?;
    let act = log_std.exp()?.broadcast_mul(&noise)?.broadcast_add(mean)?.tanh()?;
    let logp = gaussian_log_prob(&noise, &log_std)?;
    let log_det = ((1.0 - act.sqr()?)? + 1e-6)?.log()?.sum_keepdim(1)?;
    Ok((act, (logp - log_det)?))
}
