#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

/// Commands whose argument is taken verbatim.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "method",
        action: "set_method",
        arg_key: "method",
    },
    CommandSpec {
        command: "aspect",
        action: "set_aspect_ratio",
        arg_key: "aspect_ratio",
    },
    CommandSpec {
        command: "prompt",
        action: "set_prompt",
        arg_key: "prompt",
    },
    CommandSpec {
        command: "view",
        action: "set_view",
        arg_key: "mode",
    },
];

pub(crate) const NUMBER_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "count",
        action: "set_count",
        arg_key: "count",
    },
    CommandSpec {
        command: "zoom",
        action: "set_zoom",
        arg_key: "zoom",
    },
    CommandSpec {
        command: "width",
        action: "resize",
        arg_key: "width",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "stage_reference",
        arg_key: "path",
    },
    CommandSpec {
        command: "delete",
        action: "delete",
        arg_key: "id",
    },
    CommandSpec {
        command: "use",
        action: "use_prompt",
        arg_key: "id",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reference",
        action: "drop_reference",
        arg_key: "paths",
    },
    CommandSpec {
        command: "drop",
        action: "drop_files",
        arg_key: "paths",
    },
    CommandSpec {
        command: "select",
        action: "select",
        arg_key: "ids",
    },
    CommandSpec {
        command: "deselect",
        action: "deselect",
        arg_key: "ids",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "unstage",
        action: "clear_reference",
        arg_key: "",
    },
    CommandSpec {
        command: "select_all",
        action: "select_all",
        arg_key: "",
    },
    CommandSpec {
        command: "deselect_all",
        action: "deselect_all",
        arg_key: "",
    },
    CommandSpec {
        command: "delete_selected",
        action: "delete_selected",
        arg_key: "",
    },
    CommandSpec {
        command: "enhance",
        action: "enhance_prompt",
        arg_key: "",
    },
    CommandSpec {
        command: "list",
        action: "list",
        arg_key: "",
    },
    CommandSpec {
        command: "layout",
        action: "layout",
        arg_key: "",
    },
    CommandSpec {
        command: "methods",
        action: "list_methods",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
];

pub(crate) const GENERATE_COMMAND: &str = "generate";
pub(crate) const PARAM_COMMAND: &str = "param";

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/generate [prompt]",
    "/prompt <text>",
    "/method <name>",
    "/methods",
    "/count <1-4>",
    "/aspect <ratio>",
    "/param <key=value>...",
    "/enhance",
    "/upload <path>",
    "/reference <path>...",
    "/unstage",
    "/drop <path>...",
    "/select <id>...",
    "/deselect <id>...",
    "/select_all",
    "/deselect_all",
    "/delete <id>",
    "/delete_selected",
    "/use <id>",
    "/zoom <percent>",
    "/width <px>",
    "/view [grid|list]",
    "/layout",
    "/list",
    "/help",
    "/quit",
];
