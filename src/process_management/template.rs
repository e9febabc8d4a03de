use crate::error_handling::types::ProcessError;

pub const PORT_TOKEN: &str = "@NTEEPORT";
pub const HOST_ADDR_TOKEN: &str = "@NTEESERVERHOSTADDR";
pub const HOST_NAME_TOKEN: &str = "@NTEESERVERHOSTNAME";

/// Runtime values substituted into the child's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    /// Port the service endpoint is bound to.
    pub port: u16,
    /// Bound IP in string form.
    pub host_addr: String,
    pub host_name: String,
}

/// Child command line with optional placeholder tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    pub fn new(argv: Vec<String>) -> Result<Self, ProcessError> {
        if argv.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(Self { argv })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Resolves every token occurrence. Replacements are sized to fit, so
    /// long host names come through whole.
    pub fn render(&self, values: &TemplateValues) -> Vec<String> {
        let port = values.port.to_string();
        self.argv
            .iter()
            .map(|arg| {
                if !arg.contains('@') {
                    return arg.clone();
                }
                arg.replace(PORT_TOKEN, &port)
                    .replace(HOST_ADDR_TOKEN, &values.host_addr)
                    .replace(HOST_NAME_TOKEN, &values.host_name)
            })
            .collect()
    }
}
