use crate::{config::ConfigError, ctf::CtfError, mrc::MrcError, orientation::SamplingError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("CTF error: {0}")]
    Ctf(#[from] CtfError),
    #[error("Orientation sampling error: {0}")]
    Sampling(#[from] SamplingError),
    #[error("MRC error: {0}")]
    Mrc(#[from] MrcError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CtfParams, OrientationSampler, SamplingMethod};

    fn sample_with(method: SamplingMethod, n: usize) -> Result<usize> {
        let sampler = OrientationSampler {
            n,
            ..OrientationSampler::default()
        };
        Ok(sampler.sample(method)?.len())
    }

    #[test]
    fn module_errors_propagate_into_crate_error() {
        assert_eq!(sample_with(SamplingMethod::SK97, 10).unwrap(), 10);
        assert!(matches!(
            sample_with(SamplingMethod::SK97, 2),
            Err(Error::Sampling(SamplingError::TooFewPoints(2)))
        ));

        let bad = CtfParams {
            voltage: 0.0,
            ..CtfParams::default()
        };
        let ctf: Result<_> = bad.ctf2d().map_err(Error::from);
        assert!(matches!(ctf, Err(Error::Ctf(CtfError::InvalidVoltage(_)))));

        let missing: Result<_> = crate::mrc::read_stack("/nonexistent/stack.mrcs").map_err(Error::from);
        assert!(matches!(missing, Err(Error::Mrc(MrcError::Io(_)))));

        let io: Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
        assert!(io.unwrap_err().to_string().contains("disk full"));
    }
}
