pub mod displays;
