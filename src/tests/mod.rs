mod robocentric_tests;
