use super::SharedMlpConfig;
use crate::model::{ModelBase, SharedDpgModel, SharedPpoModel, SharedSacModel};
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{init::Init, linear, Linear, VarBuilder};

/// `enc_s` and `net` are trained with a smaller learning rate.
fn encoder_lr_scale(name: &str) -> f64 {
    if name.starts_with("enc_s") || name.starts_with("net") {
        0.9
    } else {
        1.0
    }
}

fn hidden(enc: &Tensor, net: &Linear) -> Result<Tensor> {
    Ok(net.forward(&enc.relu()?)?.relu()?)
}

/// Deterministic actor and Q-function with a common state encoder and trunk.
///
/// `act(s) = tanh(dec_a(net(enc_s(s))))` and
/// `critic(s, a) = dec_q(net(enc_s(s) + enc_a(a)))`.
pub struct SharedDpgMlp {
    device: Device,
    enc_s: Linear,
    enc_a: Linear,
    net: Linear,
    dec_a: Linear,
    dec_q: Linear,
}

impl ModelBase for SharedDpgMlp {
    type Config = SharedMlpConfig;

    fn build(vb: VarBuilder, c: Self::Config) -> Result<Self> {
        Ok(Self {
            device: vb.device().clone(),
            enc_s: linear(c.state_dim, c.mid_dim, vb.pp("enc_s"))?,
            enc_a: linear(c.action_dim, c.mid_dim, vb.pp("enc_a"))?,
            net: linear(c.mid_dim, c.mid_dim, vb.pp("net"))?,
            dec_a: linear(c.mid_dim, c.action_dim, vb.pp("dec_a"))?,
            dec_q: linear(c.mid_dim, 1, vb.pp("dec_q"))?,
        })
    }

    fn lr_scale(name: &str) -> f64 {
        encoder_lr_scale(name)
    }
}

impl SharedDpgModel for SharedDpgMlp {
    fn act(&self, obs: &Tensor) -> Result<Tensor> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?;
        Ok(self.dec_a.forward(&hidden(&s, &self.net)?)?.tanh()?)
    }

    fn critic(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?;
        let a = self.enc_a.forward(&act.to_device(&self.device)?)?;
        Ok(self.dec_q.forward(&hidden(&(s + a)?, &self.net)?)?)
    }
}

/// Gaussian policy and twin Q-functions with a common state encoder and trunk.
pub struct SharedSacMlp {
    device: Device,
    enc_s: Linear,
    enc_a: Linear,
    net: Linear,
    dec_a_mean: Linear,
    dec_a_log_std: Linear,
    dec_q1: Linear,
    dec_q2: Linear,
}

impl ModelBase for SharedSacMlp {
    type Config = SharedMlpConfig;

    fn build(vb: VarBuilder, c: Self::Config) -> Result<Self> {
        Ok(Self {
            device: vb.device().clone(),
            enc_s: linear(c.state_dim, c.mid_dim, vb.pp("enc_s"))?,
            enc_a: linear(c.action_dim, c.mid_dim, vb.pp("enc_a"))?,
            net: linear(c.mid_dim, c.mid_dim, vb.pp("net"))?,
            dec_a_mean: linear(c.mid_dim, c.action_dim, vb.pp("dec_a_mean"))?,
            dec_a_log_std: linear(c.mid_dim, c.action_dim, vb.pp("dec_a_log_std"))?,
            dec_q1: linear(c.mid_dim, 1, vb.pp("dec_q1"))?,
            dec_q2: linear(c.mid_dim, 1, vb.pp("dec_q2"))?,
        })
    }

    fn lr_scale(name: &str) -> f64 {
        encoder_lr_scale(name)
    }
}

impl SharedSacModel for SharedSacMlp {
    fn policy(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?;
        let h = hidden(&s, &self.net)?;
        Ok((self.dec_a_mean.forward(&h)?, self.dec_a_log_std.forward(&h)?))
    }

    fn q1_q2(&self, obs: &Tensor, act: &Tensor) -> Result<(Tensor, Tensor)> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?;
        let a = self.enc_a.forward(&act.to_device(&self.device)?)?;
        let h = hidden(&(s + a)?, &self.net)?;
        Ok((self.dec_q1.forward(&h)?, self.dec_q2.forward(&h)?))
    }
}

/// Gaussian policy with a state-independent standard deviation and a state
/// value function, sharing the state encoder.
pub struct SharedPpoMlp {
    device: Device,
    enc_s: Linear,
    dec_a: Linear,
    dec_v: Linear,
    a_std_log: Tensor,
}

impl ModelBase for SharedPpoMlp {
    type Config = SharedMlpConfig;

    fn build(vb: VarBuilder, c: Self::Config) -> Result<Self> {
        let a_std_log = vb.get_with_hints((1, c.action_dim), "a_std_log", Init::Const(-0.5))?;
        Ok(Self {
            device: vb.device().clone(),
            enc_s: linear(c.state_dim, c.mid_dim, vb.pp("enc_s"))?,
            dec_a: linear(c.mid_dim, c.action_dim, vb.pp("dec_a"))?,
            dec_v: linear(c.mid_dim, 1, vb.pp("dec_v"))?,
            a_std_log,
        })
    }

    fn lr_scale(name: &str) -> f64 {
        if name.starts_with("enc_s") {
            0.9
        } else {
            1.0
        }
    }
}

impl SharedPpoModel for SharedPpoMlp {
    fn action_mean(&self, obs: &Tensor) -> Result<Tensor> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?.relu()?;
        Ok(self.dec_a.forward(&s)?)
    }

    fn value(&self, obs: &Tensor) -> Result<Tensor> {
        let s = self.enc_s.forward(&obs.to_device(&self.device)?)?.relu()?;
        Ok(self.dec_v.forward(&s)?)
    }

    fn log_std(&self) -> Result<Tensor> {
        Ok(self.a_std_log.clone())
    }
}
