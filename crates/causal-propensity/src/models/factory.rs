use crate::config::{ModelConfig, ModelType};
use crate::error::Result;
use crate::models::propensity::{
    GradientBoostedPropensityModel, LogisticRegressionPropensityModel, PropensityModel,
};

/// Build an unfitted propensity model from its configuration.
pub fn build_model(config: &ModelConfig) -> Result<Box<dyn PropensityModel>> {
    log::trace!("Building propensity model: {:?}", config.model_type);
    match &config.model_type {
        ModelType::ElasticNet(params) => Ok(Box::new(LogisticRegressionPropensityModel::new(
            params.clone(),
            config.clip_bounds,
        )?)),
        ModelType::GradientBoosted { config: params, early_stopping } => Ok(Box::new(
            GradientBoostedPropensityModel::new(params.clone(), *early_stopping, config.clip_bounds)?,
        )),
    }
}
