pub mod classifier_trait;
pub mod early_stopping;
pub mod factory;
pub mod gbdt;
pub mod logistic;
pub mod propensity;
pub mod tree;
pub mod utils;

pub use classifier_trait::{Classifier, ProbabilisticClassifier};
pub use factory::build_model;
pub use gbdt::GradientBoostingClassifier;
pub use logistic::LogisticRegressionCv;
pub use propensity::{
    ElasticNetPropensityModel, GradientBoostedPropensityModel, LogisticRegressionPropensityModel, PropensityModel,
};
