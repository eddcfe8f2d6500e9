//! Utilities.
use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use ndarray::{Array2, Array3};
use num_traits::AsPrimitive;

/// Apply soft update on variables.
///
/// Variables are identified by their names after replacing `ss_dest` in the
/// name of the destination variable with `ss_src`.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track_with_replace_substring(
    dest: &VarMap,
    src: &VarMap,
    tau: f64,
    (ss_src, ss_dest): (&str, &str),
) -> Result<()> {
    let dest = dest.data().lock().map_err(|e| anyhow!("{}", e))?;
    let src = src.data().lock().map_err(|e| anyhow!("{}", e))?;

    for (k_dest, v_dest) in dest.iter() {
        let k_src = k_dest.replace(ss_dest, ss_src);
        let v_src = src
            .get(&k_src)
            .with_context(|| format!("No source variable {} for {}", k_src, k_dest))?;
        let t_dest = ((tau * v_src.as_tensor())? + (1.0 - tau) * v_dest.as_tensor())?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Returns the TD target `reward + gamma * (1 - is_done) * q_next`.
///
/// All tensors have shape `[batch_size]`.
pub fn td_target(reward: &Tensor, is_done: &Tensor, gamma: f64, q_next: &Tensor) -> Result<Tensor> {
    let not_done = is_done.affine(-1.0, 1.0)?;
    Ok((reward + (not_done * q_next)?.affine(gamma, 0.0)?)?)
}

/// Returns the standard deviation of a tensor.
pub fn std(t: &Tensor) -> Result<f32> {
    Ok(t.broadcast_sub(&t.mean_all()?)?
        .sqr()?
        .mean_all()?
        .sqrt()?
        .to_scalar::<f32>()?)
}

/// Returns the mean of a tensor.
pub fn mean(t: &Tensor) -> Result<f32> {
    Ok(t.mean_all()?.to_scalar::<f32>()?)
}

/// Converts a vector into a 1-dimensional `f32` tensor.
pub fn vec_to_tensor<T>(v: &[T], device: &Device) -> Result<Tensor>
where
    T: AsPrimitive<f32>,
{
    let v = v.iter().map(|e| e.as_()).collect::<Vec<f32>>();
    let n = v.len();
    Ok(Tensor::from_vec(v, (n,), device)?)
}

/// Converts a batch of histories into a tensor of the same shape.
pub fn array3_to_tensor(a: &Array3<f32>, device: &Device) -> Result<Tensor> {
    let v = a.iter().copied().collect::<Vec<_>>();
    Ok(Tensor::from_vec(v, a.dim(), device)?)
}

/// Converts a 2-dimensional array into a tensor of the same shape.
pub fn array2_to_tensor(a: &Array2<f32>, device: &Device) -> Result<Tensor> {
    let v = a.iter().copied().collect::<Vec<_>>();
    Ok(Tensor::from_vec(v, a.dim(), device)?)
}

/// Converts a 2-dimensional tensor into an array.
pub fn tensor_to_array2(t: &Tensor) -> Result<Array2<f32>> {
    let (n, d) = t.dims2()?;
    let v = t.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array2::from_shape_vec((n, d), v)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    fn varmap_with(name: &str, values: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((values.len(),), name, init, DType::F32, &Device::Cpu)?;
        let t = Tensor::from_slice(values, (values.len(),), &Device::Cpu)?;
        vm.data().lock().unwrap().get(name).unwrap().set(&t)?;
        Ok(vm)
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let vm_src = varmap_with("actor.var1", &[1.0, 2.0, 3.0])?;
        let vm_dest = varmap_with("actor_tgt.var1", &[4.0, 5.0, 6.0])?;
        track_with_replace_substring(&vm_dest, &vm_src, tau, ("actor", "actor_tgt"))?;

        let t = vm_dest
            .data()
            .lock()
            .unwrap()
            .get("actor_tgt.var1")
            .unwrap()
            .as_tensor()
            .to_vec1::<f32>()?;
        let expected = [1.9f32, 2.9, 3.9];
        for (a, b) in t.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_track_missing_source() -> Result<()> {
        let vm_src = varmap_with("actor.var1", &[1.0])?;
        let vm_dest = varmap_with("actor_tgt.var2", &[4.0])?;
        assert!(track_with_replace_substring(&vm_dest, &vm_src, 0.5, ("actor", "actor_tgt")).is_err());
        Ok(())
    }

    #[test]
    fn test_td_target() -> Result<()> {
        let device = Device::Cpu;
        let reward = vec_to_tensor(&[1.0f32, 1.0], &device)?;
        let is_done = vec_to_tensor(&[0i8, 1], &device)?;
        let q_next = vec_to_tensor(&[2.0f32, 2.0], &device)?;

        let target = td_target(&reward, &is_done, 0.95, &q_next)?.to_vec1::<f32>()?;
        assert!((target[0] - 2.9).abs() < 1e-6);
        assert!((target[1] - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_std_and_mean() -> Result<()> {
        let t = vec_to_tensor(&[1.0f32, 3.0, 1.0, 3.0], &Device::Cpu)?;
        assert!((std(&t)? - 1.0).abs() < 1e-6);
        assert!((mean(&t)? - 2.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_array_conversion() -> Result<()> {
        let a = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 12 + j * 4 + k) as f32);
        let t = array3_to_tensor(&a, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 3, 4]);
        assert_eq!(t.flatten_all()?.to_vec1::<f32>()?[13], 13.0);

        let b = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f32);
        let t = array2_to_tensor(&b, &Device::Cpu)?;
        assert_eq!(tensor_to_array2(&t)?, b);
        Ok(())
    }
}
