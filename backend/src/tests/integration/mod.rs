mod accounting;
mod settlements;
