mod min_sdk_cases;
mod robustness;
