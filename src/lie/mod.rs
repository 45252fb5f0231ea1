pub mod so3;
