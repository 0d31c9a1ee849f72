/*!
Command handlers for the CLI

This module provides the command handlers invoked by the CLI
entrypoint:

- `chat`    — interactive streaming chat session
- `history` — browse, search, archive, and delete saved sessions

The handlers are thin consumers of the library components: providers,
the session controller, and persistence.
*/

pub mod chat;
pub mod history;
