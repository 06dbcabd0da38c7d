#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose argument is an option code (`/source en-uk`).
pub(crate) const OPTION_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "source",
        action: "set_source",
    },
    CommandSpec {
        command: "target",
        action: "set_target",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
    },
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "op",
        action: "toggle_operation",
    },
    CommandSpec {
        command: "cite",
        action: "set_citation",
    },
    CommandSpec {
        command: "lang",
        action: "set_ui_language",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
];

/// Commands that take the rest of the line verbatim.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "url",
    action: "set_url",
}];

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "file",
        action: "attach_file",
    },
    CommandSpec {
        command: "image",
        action: "attach_file",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "remove_image",
    action: "remove_image",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "run",
        action: "run",
    },
    CommandSpec {
        command: "pause",
        action: "toggle_pause",
    },
    CommandSpec {
        command: "resume",
        action: "resume",
    },
    CommandSpec {
        command: "stop",
        action: "stop",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "clear",
        action: "clear_output",
    },
    CommandSpec {
        command: "clear_url",
        action: "clear_url",
    },
    CommandSpec {
        command: "clear_text",
        action: "clear_text",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "result",
        action: "show_result",
    },
    CommandSpec {
        command: "insert_sources",
        action: "insert_sources",
    },
    CommandSpec {
        command: "options",
        action: "list_options",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/source",
    "/target",
    "/style",
    "/mode",
    "/op",
    "/cite",
    "/lang",
    "/model",
    "/url",
    "/clear_url",
    "/clear_text",
    "/file",
    "/image",
    "/remove_image",
    "/run",
    "/pause",
    "/resume",
    "/stop",
    "/reset",
    "/clear",
    "/status",
    "/result",
    "/insert_sources",
    "/options",
    "/help",
    "/quit",
];
