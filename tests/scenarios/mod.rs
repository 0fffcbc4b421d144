mod network_changes;
mod provider_states;
mod user_actions;
