mod activity;
mod advice;
mod auth;
mod export;
mod helpers;
mod profile;
mod summary;
mod sync;
mod water;
mod weight;

pub(crate) use activity::{
    cmd_add_food, cmd_add_gym, cmd_add_run, cmd_add_sleep, cmd_add_steps, cmd_list,
};
pub(crate) use advice::cmd_advice;
pub(crate) use auth::{cmd_login, cmd_login_google, cmd_logout, cmd_register, cmd_whoami};
pub(crate) use export::{cmd_export_csv, cmd_export_json};
pub(crate) use profile::{cmd_profile_edit, cmd_profile_show};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use sync::{cmd_clear, cmd_sync};
pub(crate) use water::{cmd_water_add, cmd_water_show};
pub(crate) use weight::{
    cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_show, cmd_weight_summary,
};
